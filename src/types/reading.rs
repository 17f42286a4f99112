//! Reading types: ingest payload, stored record, and energy derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    DEFAULT_STREAM, MAX_STREAM_NAME_LEN, SAMPLES_PER_HOUR, WATTS_PER_KILOWATT,
};

/// Store-assigned reading identifier.
pub type ReadingId = u64;

/// Derive the energy of one sample from its power.
///
/// Assumes one-minute sampling: `power / 1000 / 60` kWh. Streams sampled at
/// any other rate get a wrong energy figure from this function.
pub fn energy_from_power(power_watts: f64) -> f64 {
    power_watts / WATTS_PER_KILOWATT / SAMPLES_PER_HOUR
}

/// Check a stream name: 1..=64 chars of `[A-Za-z0-9_.-]`.
pub fn is_valid_stream_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_STREAM_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn default_stream() -> String {
    DEFAULT_STREAM.to_string()
}

/// Raw reading as submitted to the ingest endpoint.
///
/// `energy` is never accepted from the client; it is derived from `power`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReading {
    /// Sensor stream this reading belongs to
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Line voltage (V)
    pub voltage: f64,
    /// Line current (A)
    pub current: f64,
    /// Active power (W)
    pub power: f64,
    /// Sample time; the server clock is used when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewReading {
    pub fn new(voltage: f64, current: f64, power: f64) -> Self {
        Self {
            stream: default_stream(),
            voltage,
            current,
            power,
            timestamp: None,
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Names of the electrical fields that are not finite numbers.
    pub fn non_finite_fields(&self) -> Vec<&'static str> {
        [
            ("voltage", self.voltage),
            ("current", self.current),
            ("power", self.power),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
        .collect()
    }
}

/// A persisted sensor reading.
///
/// Immutable after `append` except for `is_anomaly` / `anomaly_score`,
/// which the ingest pipeline sets at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: ReadingId,
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    /// kWh, derived at ingest (see [`energy_from_power`])
    pub energy: f64,
    /// `None` only for records written by an external collaborator
    #[serde(default)]
    pub is_anomaly: Option<bool>,
    /// Model decision score, lower = more anomalous; `None` until scored
    #[serde(default)]
    pub anomaly_score: Option<f64>,
}

impl Reading {
    /// Whether the pipeline has attached a score to this reading.
    pub fn is_scored(&self) -> bool {
        self.anomaly_score.is_some()
    }

    /// True only for readings flagged anomalous.
    pub fn flagged(&self) -> bool {
        self.is_anomaly == Some(true)
    }
}

/// A reading ready to be written: everything except the store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingDraft {
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub energy: f64,
}

impl ReadingDraft {
    /// Build the draft for a validated payload, deriving energy.
    pub fn from_new(new: &NewReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            stream: new.stream.clone(),
            timestamp,
            voltage: new.voltage,
            current: new.current,
            power: new.power,
            energy: energy_from_power(new.power),
        }
    }

    /// Attach the id; a fresh reading is unflagged and unscored.
    pub fn into_reading(self, id: ReadingId) -> Reading {
        Reading {
            id,
            stream: self.stream,
            timestamp: self.timestamp,
            voltage: self.voltage,
            current: self.current,
            power: self.power,
            energy: self.energy,
            is_anomaly: Some(false),
            anomaly_score: None,
        }
    }
}
