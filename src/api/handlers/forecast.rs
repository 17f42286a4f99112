//! Energy forecast endpoint

use axum::extract::{Query, State};
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{stream_filter, ApiState};
use crate::analytics::round_to;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::FORECAST_ENERGY_DECIMALS;
use crate::ml_engine::{EnergySample, ForecastMode};
use crate::types::ForecastPoint;

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    /// Horizon in hours (default 6, max 168)
    #[serde(default)]
    pub hours: Option<usize>,
    #[serde(default)]
    pub stream: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub mode: ForecastMode,
    /// Readings the forecast was computed from
    pub history_points: usize,
    pub predictions: Vec<ForecastPoint>,
}

/// GET /api/v1/analytics/predict-energy
pub async fn get_energy_forecast(
    State(state): State<ApiState>,
    Query(query): Query<ForecastQuery>,
) -> Response {
    let stream = match stream_filter(query.stream.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let config = state.forecaster.config();
    let steps = query.hours.unwrap_or(config.default_steps);
    if steps == 0 || steps > config.max_steps {
        return ApiErrorResponse::bad_request(format!(
            "hours must be between 1 and {}",
            config.max_steps
        ));
    }

    let since = Utc::now() - Duration::hours(config.history_hours);
    let history: Vec<EnergySample> = match state.store.since(stream, since).await {
        Ok(readings) => readings.iter().map(EnergySample::from).collect(),
        Err(e) => return ApiErrorResponse::storage(&e),
    };

    let predictions = state
        .forecaster
        .forecast(&history, steps)
        .into_iter()
        .map(|p| ForecastPoint {
            energy: round_to(p.energy, FORECAST_ENERGY_DECIMALS),
            ..p
        })
        .collect();

    ApiResponse::ok(ForecastResponse {
        mode: state.forecaster.mode(),
        history_points: history.len(),
        predictions,
    })
}
