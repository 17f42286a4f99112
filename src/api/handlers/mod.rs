//! API route handlers
//!
//! - `sensors`: reading ingestion
//! - `analytics`: aggregate queries, anomaly listing, liveness
//! - `forecast`: energy forecast
//! - `live`: WebSocket live feed

mod analytics;
mod forecast;
mod live;
mod sensors;

pub use analytics::*;
pub use forecast::*;
pub use live::*;
pub use sensors::*;

use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::envelope::ApiErrorResponse;
use crate::config::{AnalyticsConfig, LiveConfig};
use crate::ml_engine::{AnomalyScorer, ForecastEngine};
use crate::pipeline::IngestionOrchestrator;
use crate::storage::ReadingStore;
use crate::types::is_valid_stream_name;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<IngestionOrchestrator>,
    /// Same store the orchestrator writes to
    pub store: Arc<dyn ReadingStore>,
    pub forecaster: Arc<ForecastEngine>,
    pub analytics: AnalyticsConfig,
    pub live: LiveConfig,
    pub started_at: Instant,
    /// Cancelled at process shutdown; ends live sessions
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(
        orchestrator: Arc<IngestionOrchestrator>,
        forecaster: Arc<ForecastEngine>,
        analytics: AnalyticsConfig,
        live: LiveConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store: Arc::clone(orchestrator.store()),
            orchestrator,
            forecaster,
            analytics,
            live,
            started_at: Instant::now(),
            shutdown,
        }
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        self.orchestrator.scorer()
    }
}

/// `?stream=` filter shared by the read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub stream: Option<String>,
}

/// Validate an optional stream filter.
fn stream_filter(stream: Option<&str>) -> Result<Option<&str>, Response> {
    match stream {
        Some(s) if !is_valid_stream_name(s) => Err(ApiErrorResponse::bad_request(format!(
            "invalid stream name '{s}'"
        ))),
        other => Ok(other),
    }
}
