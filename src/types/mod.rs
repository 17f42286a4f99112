//! Shared data structures for the sensor ingestion and scoring pipeline
//!
//! One named type per pipeline stage:
//! - `NewReading` / `Reading`: raw ingest payload and the stored record
//! - `FeatureVector`: anomaly-path features derived from a reading window
//! - `ForecastPoint`: one step of an energy forecast
//! - Analytics rows and the live-feed `LiveSnapshot`

mod reading;
mod features;
mod forecast;
mod analytics;

pub use reading::*;
pub use features::*;
pub use forecast::*;
pub use analytics::*;
