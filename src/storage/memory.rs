//! In-memory reading store for tests and minimal deployments.
//!
//! Thread-safe via `RwLock`. Not durable, data is lost on restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AnnotationUpdate, ReadingStore, StorageError};
use crate::types::{Reading, ReadingDraft, ReadingId};

/// Vector-backed store, kept sorted by `(timestamp, id)`.
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<Reading>>,
    next_id: AtomicU64,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn matches(reading: &Reading, stream: Option<&str>) -> bool {
        stream.map_or(true, |s| reading.stream == s)
    }
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Database(e.to_string())
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn append(&self, draft: &ReadingDraft) -> Result<ReadingId, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reading = draft.clone().into_reading(id);
        let mut store = self.readings.write().map_err(poisoned)?;

        // Appends are almost always in order; insert after equal timestamps
        let pos = store.partition_point(|r| r.timestamp <= reading.timestamp);
        store.insert(pos, reading);
        Ok(id)
    }

    async fn get(&self, id: ReadingId) -> Result<Option<Reading>, StorageError> {
        let store = self.readings.read().map_err(poisoned)?;
        Ok(store.iter().find(|r| r.id == id).cloned())
    }

    async fn latest(
        &self,
        stream: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError> {
        let store = self.readings.read().map_err(poisoned)?;
        Ok(store
            .iter()
            .rev()
            .filter(|r| Self::matches(r, stream))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn since(
        &self,
        stream: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        let store = self.readings.read().map_err(poisoned)?;
        let start = store.partition_point(|r| r.timestamp < since);
        Ok(store[start..]
            .iter()
            .filter(|r| Self::matches(r, stream))
            .cloned()
            .collect())
    }

    async fn update_annotation(
        &self,
        id: ReadingId,
        is_anomaly: bool,
        score: f64,
    ) -> Result<AnnotationUpdate, StorageError> {
        let mut store = self.readings.write().map_err(poisoned)?;
        match store.iter_mut().find(|r| r.id == id) {
            Some(reading) => {
                reading.is_anomaly = Some(is_anomaly);
                reading.anomaly_score = Some(score);
                Ok(AnnotationUpdate::Updated)
            }
            None => Ok(AnnotationUpdate::NotFound),
        }
    }

    async fn count(&self, stream: Option<&str>) -> Result<usize, StorageError> {
        let store = self.readings.read().map_err(poisoned)?;
        Ok(store.iter().filter(|r| Self::matches(r, stream)).count())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
