//! Reading Store
//!
//! Append-only, timestamp-ordered log of sensor readings. The pipeline only
//! talks to the [`ReadingStore`] trait, so backends can be swapped without
//! touching ingestion or analytics:
//! - [`SledReadingStore`]: durable sled backend used by the server
//! - [`InMemoryReadingStore`]: for tests and minimal deployments

mod lockfile;
mod memory;
mod sled_store;

pub use lockfile::{DataDirLock, LockError};
pub use memory::InMemoryReadingStore;
pub use sled_store::SledReadingStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Reading, ReadingDraft, ReadingId};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("corrupt index entry: {0}")]
    CorruptIndex(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result of writing an annotation back onto a stored reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationUpdate {
    Updated,
    NotFound,
}

/// Ordered reading log shared by the ingest pipeline and the read side.
///
/// Implementations must be thread-safe and must not lose appends made
/// concurrently from different streams. `stream = None` on a query means
/// "all streams".
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist a new reading and return its id.
    async fn append(&self, draft: &ReadingDraft) -> Result<ReadingId, StorageError>;

    /// Fetch one reading by id.
    async fn get(&self, id: ReadingId) -> Result<Option<Reading>, StorageError>;

    /// The `limit` most recent readings, newest first.
    async fn latest(
        &self,
        stream: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError>;

    /// Readings with `timestamp >= since`, oldest first.
    async fn since(
        &self,
        stream: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError>;

    /// Set the anomaly fields of a stored reading.
    async fn update_annotation(
        &self,
        id: ReadingId,
        is_anomaly: bool,
        score: f64,
    ) -> Result<AnnotationUpdate, StorageError>;

    /// Number of stored readings.
    async fn count(&self, stream: Option<&str>) -> Result<usize, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// All readings, oldest first.
pub async fn all_readings(
    store: &dyn ReadingStore,
    stream: Option<&str>,
) -> Result<Vec<Reading>, StorageError> {
    store.since(stream, DateTime::<Utc>::MIN_UTC).await
}
