//! Feature vectors: the fixed input contracts of the scoring models.

use serde::{Deserialize, Serialize};

/// Column order of the anomaly model input.
pub const ANOMALY_FEATURE_NAMES: [&str; 5] =
    ["power", "rolling_mean_5", "rolling_std_5", "delta", "hour"];

/// Column order of the forecast model input.
pub const FORECAST_FEATURE_NAMES: [&str; 4] =
    ["last_energy", "rolling_mean_6", "hour", "is_weekend"];

/// Anomaly-path features for one reading.
///
/// Derived and never persisted. Exists only for readings with a complete
/// five-row lookback and a defined delta.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub power: f64,
    pub rolling_mean_5: f64,
    /// Sample standard deviation (n - 1) over the same window
    pub rolling_std_5: f64,
    pub delta: f64,
    /// Hour of day of the reading, 0..=23
    pub hour: u32,
}

impl FeatureVector {
    /// Model input in [`ANOMALY_FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.power,
            self.rolling_mean_5,
            self.rolling_std_5,
            self.delta,
            f64::from(self.hour),
        ]
    }
}

/// One row of the forecast model input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastFeatures {
    /// Energy of the previous hourly bucket (or previous predicted step)
    pub last_energy: f64,
    pub rolling_mean_6: f64,
    pub hour: u32,
    pub is_weekend: bool,
}

impl ForecastFeatures {
    /// Model input in [`FORECAST_FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; 4] {
        [
            self.last_energy,
            self.rolling_mean_6,
            f64::from(self.hour),
            if self.is_weekend { 1.0 } else { 0.0 },
        ]
    }
}
