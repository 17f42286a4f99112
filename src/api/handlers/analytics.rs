//! Analytics, anomaly and liveness endpoints
//!
//! All handlers here are read-only.

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{stream_filter, ApiState, StreamQuery};
use crate::analytics;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::ml_engine::ForecastMode;
use crate::pipeline::IngestStats;

/// Peak load query parameters
#[derive(Debug, Deserialize)]
pub struct PeakQuery {
    /// Power threshold in W (default from config, 1500)
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub stream: Option<String>,
}

/// Anomaly query parameters
#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    /// Lower bound, RFC 3339 (default: all history)
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

/// GET /api/v1/analytics/daily-energy
pub async fn get_daily_energy(
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match analytics::daily_energy(state.store.as_ref(), stream).await {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// GET /api/v1/analytics/hourly-average-power
pub async fn get_hourly_average_power(
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match analytics::hourly_average_power(state.store.as_ref(), stream).await {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// GET /api/v1/analytics/peak-loads
pub async fn get_peak_loads(
    State(state): State<ApiState>,
    Query(query): Query<PeakQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let threshold = query.threshold.unwrap_or(state.analytics.peak_threshold_w);
    if !threshold.is_finite() {
        return ApiErrorResponse::bad_request("threshold must be a finite number");
    }
    match analytics::peak_loads(state.store.as_ref(), stream, threshold).await {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// GET /api/v1/analytics/anomalies
pub async fn get_anomalies(
    State(state): State<ApiState>,
    Query(query): Query<AnomalyQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let since = query.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let limit = query
        .limit
        .unwrap_or(state.analytics.anomaly_limit)
        .min(state.analytics.anomaly_limit);
    match analytics::anomalies_since(state.store.as_ref(), stream, since, limit).await {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// GET /api/v1/analytics/count - Stored reading count
pub async fn get_count(
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match state.store.count(stream).await {
        Ok(count) => ApiResponse::ok(CountResponse { count }),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// GET /api/v1/ping
pub async fn ping() -> Response {
    ApiResponse::ok(serde_json::json!({ "analytics": "alive" }))
}

/// Process health for `/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub store_backend: &'static str,
    pub anomaly_model: &'static str,
    pub forecast_mode: ForecastMode,
    pub ingest: IngestStats,
}

/// GET /health - Legacy root health probe
pub async fn legacy_health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        store_backend: state.store.backend_name(),
        anomaly_model: state.scorer().model().kind(),
        forecast_mode: state.forecaster.mode(),
        ingest: state.orchestrator.stats(),
    })
}

/// GET / - Root banner
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "GridSense backend running" }))
}
