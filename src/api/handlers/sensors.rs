//! Reading ingestion endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::pipeline::{IngestError, IngestOutcome};
use crate::types::{NewReading, Reading};

/// Stored reading plus how far the pipeline got with it.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    #[serde(flatten)]
    pub reading: Reading,
    /// `scored`, `insufficient_history` or `unscored`
    pub status: &'static str,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        let status = outcome.status();
        Self {
            reading: outcome.into_reading(),
            status,
        }
    }
}

/// POST /api/v1/sensors/power - Ingest one reading
pub async fn ingest_reading(
    State(state): State<ApiState>,
    payload: Result<Json<NewReading>, JsonRejection>,
) -> Response {
    let Json(new) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    match state.orchestrator.ingest(new).await {
        Ok(outcome) => ApiResponse::ok(IngestResponse::from(outcome)),
        Err(IngestError::Validation(msg)) => ApiErrorResponse::bad_request(msg),
        Err(IngestError::Storage(e)) => ApiErrorResponse::storage(&e),
    }
}
