//! Forecast output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which code path produced a forecast point.
///
/// `FutureForecast` is the tag used by an alternate training variant. It
/// carries the same meaning as `MlForecast`; consumers must not tell them
/// apart. The engine itself only emits `BaselineForecast` and `MlForecast`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    BaselineForecast,
    MlForecast,
    FutureForecast,
}

impl ForecastSource {
    /// True for points produced by a trained model.
    pub fn is_model_output(self) -> bool {
        matches!(self, Self::MlForecast | Self::FutureForecast)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaselineForecast => "baseline_forecast",
            Self::MlForecast => "ml_forecast",
            Self::FutureForecast => "future_forecast",
        }
    }
}

impl PartialEq for ForecastSource {
    fn eq(&self, other: &Self) -> bool {
        self.is_model_output() == other.is_model_output()
    }
}

impl std::fmt::Display for ForecastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hourly step of an energy forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Predicted kWh for the hour, never negative
    pub energy: f64,
    pub is_future: bool,
    #[serde(rename = "type")]
    pub source: ForecastSource,
}
