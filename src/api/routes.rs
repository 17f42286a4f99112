//! API route definitions
//!
//! - /api/v1/sensors/power - Reading ingestion
//! - /api/v1/analytics/* - Aggregates, anomalies, forecast
//! - /api/v1/ping - Liveness

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

/// Create all `/api/v1` routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/sensors/power", post(handlers::ingest_reading))
        .route("/analytics/anomalies", get(handlers::get_anomalies))
        .route("/analytics/predict-energy", get(handlers::get_energy_forecast))
        .route("/analytics/daily-energy", get(handlers::get_daily_energy))
        .route(
            "/analytics/hourly-average-power",
            get(handlers::get_hourly_average_power),
        )
        .route("/analytics/peak-loads", get(handlers::get_peak_loads))
        .route("/analytics/count", get(handlers::get_count))
        .route("/ping", get(handlers::ping))
        .with_state(state)
}

/// Root-level routes: banner, health probe, live feed
pub fn legacy_routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::legacy_health_check))
        .route("/ws/live", get(handlers::live_feed))
        .with_state(state)
}
