//! Read-only aggregate queries over the reading store.
//!
//! Nothing here writes; every function is safe to call concurrently with
//! ingestion.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::storage::{all_readings, ReadingStore, StorageError};
use crate::types::{AnomalyRecord, DailyEnergy, HourlyAveragePower, LiveSnapshot, PeakLoad};

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Total energy per UTC date, oldest first, rounded to 2 places.
pub async fn daily_energy(
    store: &dyn ReadingStore,
    stream: Option<&str>,
) -> Result<Vec<DailyEnergy>, StorageError> {
    let mut totals = BTreeMap::new();
    for r in all_readings(store, stream).await? {
        *totals.entry(r.timestamp.date_naive()).or_insert(0.0) += r.energy;
    }
    Ok(totals
        .into_iter()
        .map(|(date, total)| DailyEnergy {
            date,
            total_energy: round_to(total, 2),
        })
        .collect())
}

/// Average power per hour of day (0-23) across all days, rounded to 2 places.
///
/// Hours with no readings are omitted.
pub async fn hourly_average_power(
    store: &dyn ReadingStore,
    stream: Option<&str>,
) -> Result<Vec<HourlyAveragePower>, StorageError> {
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for r in all_readings(store, stream).await? {
        let entry = sums.entry(r.timestamp.hour()).or_insert((0.0, 0));
        entry.0 += r.power;
        entry.1 += 1;
    }
    Ok(sums
        .into_iter()
        .map(|(hour, (sum, n))| HourlyAveragePower {
            hour,
            avg_power: round_to(sum / n as f64, 2),
        })
        .collect())
}

/// Readings with power strictly above `threshold`, highest power first.
pub async fn peak_loads(
    store: &dyn ReadingStore,
    stream: Option<&str>,
    threshold: f64,
) -> Result<Vec<PeakLoad>, StorageError> {
    let mut peaks: Vec<PeakLoad> = all_readings(store, stream)
        .await?
        .iter()
        .filter(|r| r.power > threshold)
        .map(PeakLoad::from)
        .collect();
    peaks.sort_by(|a, b| b.power.total_cmp(&a.power));
    Ok(peaks)
}

/// Flagged readings at or after `since`, newest first, at most `limit`.
pub async fn anomalies_since(
    store: &dyn ReadingStore,
    stream: Option<&str>,
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<AnomalyRecord>, StorageError> {
    Ok(store
        .since(stream, since)
        .await?
        .iter()
        .rev()
        .filter(|r| r.flagged())
        .take(limit)
        .map(AnomalyRecord::from)
        .collect())
}

/// Latest reading plus statistics over the trailing `window`.
///
/// `None` when there is no reading at all or none inside the window; the
/// live feed skips that cycle.
pub async fn live_snapshot(
    store: &dyn ReadingStore,
    stream: Option<&str>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<Option<LiveSnapshot>, StorageError> {
    let Some(latest) = store.latest(stream, 1).await?.into_iter().next() else {
        return Ok(None);
    };
    let recent = store.since(stream, now - window).await?;
    if recent.is_empty() {
        return Ok(None);
    }

    let sum: f64 = recent.iter().map(|r| r.power).sum();
    let max = recent
        .iter()
        .map(|r| r.power)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(Some(LiveSnapshot {
        timestamp: latest.timestamp,
        current_power: latest.power,
        current_voltage: latest.voltage,
        current_current: latest.current,
        avg_power_1h: round_to(sum / recent.len() as f64, 2),
        max_power_1h: max,
        reading_count: recent.len(),
    }))
}
