//! GridSense: electrical sensor ingestion with streaming anomaly scoring
//! and short-horizon energy forecasting.
//!
//! ## Architecture
//!
//! - **Reading Store**: append-only, timestamp-ordered reading log (sled)
//! - **Feature Builder**: rolling five-sample features over the latest readings
//! - **Anomaly Scorer**: isolation-forest verdict on the newest reading
//! - **Forecast Engine**: hourly resampling and autoregressive rollout, with
//!   a moving-average baseline when no forecast model is available
//! - **Ingestion Orchestrator**: store, read back, score, annotate
//! - **API**: axum HTTP endpoints and a WebSocket live feed

pub mod analytics;
pub mod api;
pub mod config;
pub mod ml_engine;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::GridSenseConfig;

// Re-export commonly used types
pub use types::{
    AnomalyRecord, DailyEnergy, FeatureVector, ForecastFeatures, ForecastPoint, ForecastSource,
    HourlyAveragePower, LiveSnapshot, NewReading, PeakLoad, Reading, ReadingId,
};

// Re-export ML Engine types
pub use ml_engine::{
    AnomalyScorer, AnomalyVerdict, ForecastEngine, ForecastMode, ModelLoad, ScoringModel,
};

// Re-export pipeline and storage
pub use pipeline::{IngestError, IngestOutcome, IngestionOrchestrator};
pub use storage::{InMemoryReadingStore, ReadingStore, SledReadingStore, StorageError};
