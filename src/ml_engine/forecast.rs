//! Forecast Engine: short-horizon hourly energy forecasts.
//!
//! Two modes, fixed for the process lifetime by the outcome of loading the
//! forecast artifact:
//!
//! - **Baseline**: the mean energy of the last few raw readings, repeated
//!   for every horizon step.
//! - **Model**: history is summed into hourly buckets (empty hours count as
//!   zero), per-bucket features are derived, and the model is rolled out
//!   autoregressively: each step's prediction becomes the next step's
//!   `last_energy` and enters the trailing mean window.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::model::{ModelLoad, ScoringModel};
use crate::config::ForecastConfig;
use crate::types::{ForecastFeatures, ForecastPoint, ForecastSource, Reading};

const SECS_PER_HOUR: i64 = 3600;

/// Minimal input row for forecasting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub timestamp: DateTime<Utc>,
    pub energy: f64,
}

impl From<&Reading> for EnergySample {
    fn from(r: &Reading) -> Self {
        Self {
            timestamp: r.timestamp,
            energy: r.energy,
        }
    }
}

/// Total energy of one clock hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyBucket {
    /// Start of the hour
    pub timestamp: DateTime<Utc>,
    pub energy: f64,
}

/// Which path this engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMode {
    Baseline,
    Model,
}

impl fmt::Display for ForecastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::Model => f.write_str("model"),
        }
    }
}

/// One forecast step with the model inputs that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastStep {
    pub point: ForecastPoint,
    /// `None` for baseline steps
    pub features: Option<ForecastFeatures>,
}

#[derive(Debug, Clone)]
pub struct ForecastEngine {
    model: Option<Arc<dyn ScoringModel>>,
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(model: Option<Arc<dyn ScoringModel>>, config: ForecastConfig) -> Self {
        Self { model, config }
    }

    /// Build from a startup load result, logging the resulting mode once.
    pub fn from_load(load: &ModelLoad, config: ForecastConfig) -> Self {
        match load {
            ModelLoad::Loaded(model) => {
                tracing::info!(kind = model.kind(), "Forecast model loaded, using model rollout");
            }
            ModelLoad::Absent(path) => {
                tracing::info!(path = %path.display(), "No forecast model, using baseline forecast");
            }
            ModelLoad::Corrupt { path, reason } => {
                tracing::error!(
                    path = %path.display(),
                    error = %reason,
                    "Forecast model unusable, using baseline forecast for this process"
                );
            }
        }
        Self::new(load.model(), config)
    }

    pub fn mode(&self) -> ForecastMode {
        if self.model.is_some() {
            ForecastMode::Model
        } else {
            ForecastMode::Baseline
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast the next `steps` hours after `history`.
    pub fn forecast(&self, history: &[EnergySample], steps: usize) -> Vec<ForecastPoint> {
        self.forecast_steps(history, steps)
            .into_iter()
            .map(|s| s.point)
            .collect()
    }

    /// Like [`Self::forecast`], keeping each step's model inputs.
    pub fn forecast_steps(&self, history: &[EnergySample], steps: usize) -> Vec<ForecastStep> {
        if history.len() < 2 || steps == 0 {
            return Vec::new();
        }
        let mut sorted = history.to_vec();
        sorted.sort_by_key(|s| s.timestamp);

        match &self.model {
            None => self.baseline(&sorted, steps),
            Some(model) => self.rollout(model.as_ref(), &sorted, steps),
        }
    }

    fn baseline(&self, sorted: &[EnergySample], steps: usize) -> Vec<ForecastStep> {
        let lookback = self.config.baseline_lookback.max(1);
        let tail = &sorted[sorted.len().saturating_sub(lookback)..];
        let average = tail.iter().map(|s| s.energy).mean();
        let Some(last) = sorted.last() else {
            return Vec::new();
        };

        (1..=steps)
            .map(|i| ForecastStep {
                point: ForecastPoint {
                    timestamp: last.timestamp + hours(i),
                    energy: average,
                    is_future: true,
                    source: ForecastSource::BaselineForecast,
                },
                features: None,
            })
            .collect()
    }

    fn rollout(
        &self,
        model: &dyn ScoringModel,
        sorted: &[EnergySample],
        steps: usize,
    ) -> Vec<ForecastStep> {
        let window = self.config.rolling_window.max(1);
        let max_buckets = usize::try_from(self.config.history_hours).unwrap_or(usize::MAX);
        let buckets = resample_hourly(sorted, max_buckets);
        let rows = derive_bucket_features(&buckets, window);
        let Some(&(last, _)) = rows.last() else {
            return Vec::new();
        };
        if rows.len() < 2 {
            return Vec::new();
        }

        let mut last_energy = last.energy;
        let mut recent: VecDeque<f64> = rows[rows.len().saturating_sub(window)..]
            .iter()
            .map(|(bucket, _)| bucket.energy)
            .collect();
        let mut out = Vec::with_capacity(steps);

        for i in 1..=steps {
            let next_time = last.timestamp + hours(i);
            let features = ForecastFeatures {
                last_energy,
                rolling_mean_6: recent.iter().mean(),
                hour: next_time.hour(),
                is_weekend: is_weekend(next_time),
            };
            let predicted = model.predict(&features.to_array()).max(0.0);

            out.push(ForecastStep {
                point: ForecastPoint {
                    timestamp: next_time,
                    energy: predicted,
                    is_future: true,
                    source: ForecastSource::MlForecast,
                },
                features: Some(features),
            });

            if recent.len() >= window {
                recent.pop_front();
            }
            recent.push_back(predicted);
            last_energy = predicted;
        }

        out
    }
}

/// Horizons and bucket spans are small; callers cap steps well below overflow.
#[allow(clippy::cast_possible_wrap)]
fn hours(n: usize) -> Duration {
    Duration::hours(n as i64)
}

fn is_weekend(ts: DateTime<Utc>) -> bool {
    ts.weekday().num_days_from_monday() >= 5
}

/// Sum ascending samples into contiguous clock-hour buckets.
///
/// Every hour between the first and last sample gets a bucket; hours with
/// no samples have zero energy. At most `max_buckets` hours ending at the
/// last sample are kept, earlier samples are ignored.
pub fn resample_hourly(sorted: &[EnergySample], max_buckets: usize) -> Vec<HourlyBucket> {
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let last_hour = last.timestamp.timestamp().div_euclid(SECS_PER_HOUR);
    let span_cap = i64::try_from(max_buckets.max(1)).unwrap_or(i64::MAX);
    let first_hour = first
        .timestamp
        .timestamp()
        .div_euclid(SECS_PER_HOUR)
        .max(last_hour.saturating_sub(span_cap - 1));
    let Some(start) = DateTime::from_timestamp(first_hour * SECS_PER_HOUR, 0) else {
        return Vec::new();
    };

    let span = usize::try_from(last_hour - first_hour).unwrap_or(0) + 1;
    let mut totals = vec![0.0; span];
    for s in sorted {
        let idx = s.timestamp.timestamp().div_euclid(SECS_PER_HOUR) - first_hour;
        if let Some(total) = usize::try_from(idx).ok().and_then(|i| totals.get_mut(i)) {
            *total += s.energy;
        }
    }

    totals
        .into_iter()
        .enumerate()
        .map(|(i, energy)| HourlyBucket {
            timestamp: start + hours(i),
            energy,
        })
        .collect()
}

/// Per-bucket model features, lagged buckets only.
///
/// `rolling_mean_6` spans up to `window` buckets ending at the bucket itself
/// (shorter at the start of the series). The first bucket has no lag and
/// is omitted.
pub fn derive_bucket_features(
    buckets: &[HourlyBucket],
    window: usize,
) -> Vec<(HourlyBucket, ForecastFeatures)> {
    let window = window.max(1);
    buckets
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, bucket)| {
            let trailing = &buckets[(i + 1).saturating_sub(window)..=i];
            let features = ForecastFeatures {
                last_energy: buckets[i - 1].energy,
                rolling_mean_6: trailing.iter().map(|b| b.energy).mean(),
                hour: bucket.timestamp.hour(),
                is_weekend: is_weekend(bucket.timestamp),
            };
            (*bucket, features)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::linear::LinearRegression;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn engine(model: Option<LinearRegression>) -> ForecastEngine {
        ForecastEngine::new(
            model.map(|m| Arc::new(m) as Arc<dyn ScoringModel>),
            ForecastConfig::default(),
        )
    }

    fn hourly(energies: &[f64]) -> Vec<EnergySample> {
        energies
            .iter()
            .enumerate()
            .map(|(i, &energy)| EnergySample {
                timestamp: at(4, 10, 0) + Duration::hours(i as i64),
                energy,
            })
            .collect()
    }

    #[test]
    fn test_baseline_mean_of_history() {
        let history = hourly(&[10.0, 20.0, 30.0]);
        let last = history[2].timestamp;
        let points = engine(None).forecast(&history, 3);

        assert_eq!(points.len(), 3);
        for (i, p) in points.iter().enumerate() {
            assert_eq!(p.energy, 20.0);
            assert_eq!(p.timestamp, last + Duration::hours(i as i64 + 1));
            assert!(p.is_future);
            assert_eq!(p.source.as_str(), "baseline_forecast");
        }
    }

    #[test]
    fn test_baseline_uses_last_ten() {
        let mut energies = vec![1000.0; 5];
        energies.extend([2.0; 10]);
        let points = engine(None).forecast(&hourly(&energies), 1);
        assert_eq!(points[0].energy, 2.0);
    }

    #[test]
    fn test_short_history_is_empty() {
        assert!(engine(None).forecast(&[], 6).is_empty());
        assert!(engine(None).forecast(&hourly(&[5.0]), 6).is_empty());
        let model = LinearRegression::new(vec![1.0, 0.0, 0.0, 0.0], 0.0);
        // two buckets leave one after dropping the first
        assert!(engine(Some(model)).forecast(&hourly(&[1.0, 2.0]), 6).is_empty());
    }

    #[test]
    fn test_rollout_is_autoregressive() {
        // prediction = last_energy + 1
        let model = LinearRegression::new(vec![1.0, 0.0, 0.0, 0.0], 1.0);
        let e = engine(Some(model));
        assert_eq!(e.mode(), ForecastMode::Model);

        let steps = e.forecast_steps(&hourly(&[1.0, 2.0, 3.0]), 4);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].features.unwrap().last_energy, 3.0);
        for pair in steps.windows(2) {
            assert_eq!(pair[1].features.unwrap().last_energy, pair[0].point.energy);
            assert_eq!(pair[1].point.timestamp - pair[0].point.timestamp, Duration::hours(1));
        }
        let energies: Vec<f64> = steps.iter().map(|s| s.point.energy).collect();
        assert_eq!(energies, vec![4.0, 5.0, 6.0, 7.0]);
        assert!(steps.iter().all(|s| s.point.source == ForecastSource::MlForecast));
    }

    #[test]
    fn test_rollout_rolling_mean_seeded_after_lag_drop() {
        // prediction = rolling_mean_6
        let model = LinearRegression::new(vec![0.0, 1.0, 0.0, 0.0], 0.0);
        let steps = engine(Some(model)).forecast_steps(&hourly(&[100.0, 2.0, 3.0]), 2);
        assert_eq!(steps[0].point.energy, 2.5);
        assert_eq!(steps[1].features.unwrap().rolling_mean_6, 2.5);
    }

    #[test]
    fn test_negative_predictions_clamped() {
        let model = LinearRegression::new(vec![0.0, 0.0, 0.0, 0.0], -3.0);
        let points = engine(Some(model)).forecast(&hourly(&[1.0, 2.0, 3.0]), 2);
        assert!(points.iter().all(|p| p.energy == 0.0));
    }

    #[test]
    fn test_resample_fills_gaps_with_zero() {
        let samples = vec![
            EnergySample { timestamp: at(4, 10, 5), energy: 1.0 },
            EnergySample { timestamp: at(4, 10, 50), energy: 0.5 },
            EnergySample { timestamp: at(4, 13, 10), energy: 2.0 },
        ];
        let buckets = resample_hourly(&samples, 168);
        let energies: Vec<f64> = buckets.iter().map(|b| b.energy).collect();
        assert_eq!(energies, vec![1.5, 0.0, 0.0, 2.0]);
        assert_eq!(buckets[0].timestamp, at(4, 10, 0));
        assert_eq!(buckets[3].timestamp, at(4, 13, 0));
    }

    #[test]
    fn test_resample_keeps_trailing_hours_only() {
        let samples = vec![
            EnergySample { timestamp: at(1, 0, 0), energy: 9.0 },
            EnergySample { timestamp: at(4, 10, 0), energy: 1.0 },
            EnergySample { timestamp: at(4, 11, 30), energy: 2.0 },
        ];
        let buckets = resample_hourly(&samples, 3);
        let energies: Vec<f64> = buckets.iter().map(|b| b.energy).collect();
        assert_eq!(energies, vec![0.0, 1.0, 2.0]);
        assert_eq!(buckets[0].timestamp, at(4, 9, 0));
    }

    #[test]
    fn test_far_future_sample_stays_bounded() {
        let far = Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap();
        let mut samples = hourly(&[1.0, 2.0, 3.0]);
        samples.push(EnergySample { timestamp: far, energy: 4.0 });

        let buckets = resample_hourly(&samples, 168);
        assert_eq!(buckets.len(), 168);
        assert_eq!(buckets.last().unwrap().energy, 4.0);

        let model = LinearRegression::new(vec![1.0, 0.0, 0.0, 0.0], 0.0);
        let points = engine(Some(model)).forecast(&samples, 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].energy, 4.0);
    }

    #[test]
    fn test_bucket_features() {
        let buckets = resample_hourly(&hourly(&[1.0, 2.0, 3.0]), 168);
        let rows = derive_bucket_features(&buckets, 6);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.last_energy, 1.0);
        assert_eq!(rows[0].1.rolling_mean_6, 1.5);
        assert_eq!(rows[1].1.rolling_mean_6, 2.0);
        assert_eq!(rows[1].1.hour, 12);
        // 2024-03-04 is a Monday
        assert!(!rows[1].1.is_weekend);
    }

    #[test]
    fn test_weekend_flag() {
        assert!(is_weekend(at(9, 0, 0)));
        assert!(is_weekend(at(10, 23, 0)));
        assert!(!is_weekend(at(11, 0, 0)));
    }

    #[test]
    fn test_from_load_absent_is_baseline() {
        let load = ModelLoad::Absent("missing.json".into());
        let e = ForecastEngine::from_load(&load, ForecastConfig::default());
        assert_eq!(e.mode(), ForecastMode::Baseline);
    }
}
