//! Feature Builder for the anomaly path.
//!
//! Turns an ordered window of `(timestamp, power)` samples into
//! [`FeatureVector`]s using a ring buffer instead of whole-table rolling
//! transforms. A row is emitted only once five earlier samples exist, so
//! both the five-sample window and the one-step delta are fully defined;
//! an input of `n` samples yields `max(0, n - 5)` rows.

use std::collections::VecDeque;

use chrono::{DateTime, Timelike, Utc};
use statrs::statistics::Statistics;

use crate::config::defaults::ANOMALY_ROLLING_WINDOW;
use crate::types::{FeatureVector, Reading};

/// Minimal input row for feature derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub power: f64,
}

impl From<&Reading> for PowerSample {
    fn from(r: &Reading) -> Self {
        Self {
            timestamp: r.timestamp,
            power: r.power,
        }
    }
}

/// Build one feature vector per eligible sample, in input order.
///
/// Input is expected ascending by timestamp. If it is not, a stably sorted
/// copy is used and all windows refer to the sorted order.
pub fn build_features(samples: &[PowerSample]) -> Vec<FeatureVector> {
    let sorted;
    let samples = if samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        samples
    } else {
        let mut copy = samples.to_vec();
        copy.sort_by_key(|s| s.timestamp);
        sorted = copy;
        sorted.as_slice()
    };

    // Window plus the sample just before it
    let capacity = ANOMALY_ROLLING_WINDOW + 1;
    let mut ring: VecDeque<f64> = VecDeque::with_capacity(capacity);
    let mut out = Vec::with_capacity(samples.len().saturating_sub(ANOMALY_ROLLING_WINDOW));

    for sample in samples {
        if ring.len() == capacity {
            ring.pop_front();
        }
        ring.push_back(sample.power);
        if ring.len() < capacity {
            continue;
        }

        let window = ring.range(1..);
        let previous = ring[ring.len() - 2];
        out.push(FeatureVector {
            power: sample.power,
            rolling_mean_5: window.clone().mean(),
            rolling_std_5: window.std_dev(),
            delta: sample.power - previous,
            hour: sample.timestamp.hour(),
        });
    }

    out
}
