//! Aggregate rows returned by the read-only analytics queries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Reading;

/// Total energy for one UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyEnergy {
    pub date: NaiveDate,
    pub total_energy: f64,
}

/// Average power for one hour of day, across all days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyAveragePower {
    pub hour: u32,
    pub avg_power: f64,
}

/// A reading whose power exceeded the peak threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeakLoad {
    pub timestamp: DateTime<Utc>,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
}

impl From<&Reading> for PeakLoad {
    fn from(r: &Reading) -> Self {
        Self {
            timestamp: r.timestamp,
            power: r.power,
            voltage: r.voltage,
            current: r.current,
        }
    }
}

/// A reading flagged anomalous, with its model score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyRecord {
    pub id: u64,
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub score: Option<f64>,
}

impl From<&Reading> for AnomalyRecord {
    fn from(r: &Reading) -> Self {
        Self {
            id: r.id,
            stream: r.stream.clone(),
            timestamp: r.timestamp,
            power: r.power,
            voltage: r.voltage,
            current: r.current,
            score: r.anomaly_score,
        }
    }
}

/// Periodic live-feed snapshot over the trailing hour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveSnapshot {
    pub timestamp: DateTime<Utc>,
    pub current_power: f64,
    pub current_voltage: f64,
    pub current_current: f64,
    pub avg_power_1h: f64,
    pub max_power_1h: f64,
    pub reading_count: usize,
}
