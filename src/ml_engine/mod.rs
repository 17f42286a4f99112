//! ML Engine: feature derivation, anomaly scoring and energy forecasting.
//!
//! Trained models arrive as versioned artifacts and are loaded once at
//! startup into immutable [`ScoringModel`] handles that are passed
//! explicitly to the components below.
//!
//! ## Architecture
//! - `model`: `ScoringModel` capability, artifact format, three-state `ModelLoad`
//! - `isolation_forest`: evaluation of exported isolation forests (anomaly path)
//! - `linear`: evaluation of exported linear regressors (forecast path)
//! - `features`: Feature Builder, rolling statistics over a ring buffer
//! - `anomaly`: Anomaly Scorer
//! - `forecast`: hourly resampling, baseline and autoregressive rollout

pub mod anomaly;
pub mod features;
pub mod forecast;
pub mod isolation_forest;
pub mod linear;
pub mod model;

// Re-export public types
pub use anomaly::{AnomalyScorer, AnomalyVerdict};
pub use features::{build_features, PowerSample};
pub use forecast::{EnergySample, ForecastEngine, ForecastMode, ForecastStep, HourlyBucket};
pub use isolation_forest::IsolationForest;
pub use linear::LinearRegression;
pub use model::{load_model, ModelArtifact, ModelLoad, ModelLoadError, ModelSpec, ScoringModel};
