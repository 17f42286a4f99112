//! Sled-backed reading store
//!
//! Three trees:
//! - `readings`: id (u64 BE) -> JSON `Reading`
//! - `by_stream`: stream ‖ 0x00 ‖ time ‖ id -> ()
//! - `by_time`: time ‖ id -> ()
//!
//! `time` is the reading timestamp in nanoseconds with the sign bit flipped,
//! big-endian, so byte order equals chronological order. The id suffix keeps
//! keys unique when timestamps repeat. An append writes all three trees in
//! one transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::Transactional;
use tracing::{debug, info, warn};

use super::{AnnotationUpdate, ReadingStore, StorageError};
use crate::types::{Reading, ReadingDraft, ReadingId};

const STREAM_SEPARATOR: u8 = 0x00;

/// Durable reading store on sled.
#[derive(Clone)]
pub struct SledReadingStore {
    db: Arc<sled::Db>,
    readings: sled::Tree,
    by_stream: sled::Tree,
    by_time: sled::Tree,
}

/// Order-preserving 8-byte encoding of a timestamp.
fn time_bytes(ts: DateTime<Utc>) -> [u8; 8] {
    let nanos = ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    });
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn time_key(ts: DateTime<Utc>, id: ReadingId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&time_bytes(ts));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn stream_prefix(stream: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(stream.len() + 1);
    key.extend_from_slice(stream.as_bytes());
    key.push(STREAM_SEPARATOR);
    key
}

fn stream_key(stream: &str, ts: DateTime<Utc>, id: ReadingId) -> Vec<u8> {
    let mut key = stream_prefix(stream);
    key.extend_from_slice(&time_key(ts, id));
    key
}

/// The reading id is always the last 8 bytes of an index key.
fn id_from_index_key(key: &[u8]) -> Result<ReadingId, StorageError> {
    let tail = key
        .len()
        .checked_sub(8)
        .map(|start| &key[start..])
        .ok_or_else(|| StorageError::CorruptIndex(format!("{} byte key", key.len())))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(tail);
    Ok(u64::from_be_bytes(bytes))
}

impl SledReadingStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!(path = %path.display(), "Reading store opened");
        Self::from_db(db)
    }

    /// Open a throwaway store that is deleted on drop.
    #[cfg(test)]
    pub fn open_temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            readings: db.open_tree("readings")?,
            by_stream: db.open_tree("by_stream")?,
            by_time: db.open_tree("by_time")?,
            db: Arc::new(db),
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, id: ReadingId) -> Result<Option<Reading>, StorageError> {
        match self.readings.get(id.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Resolve index entries to readings, skipping dangling ones.
    fn resolve<I>(&self, keys: I) -> Result<Vec<Reading>, StorageError>
    where
        I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    {
        let mut out = Vec::new();
        for item in keys {
            let (key, _) = item?;
            let id = id_from_index_key(&key)?;
            match self.load(id)? {
                Some(reading) => out.push(reading),
                None => warn!(id, "Index entry points at a missing reading"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ReadingStore for SledReadingStore {
    async fn append(&self, draft: &ReadingDraft) -> Result<ReadingId, StorageError> {
        let id = self.db.generate_id()?;
        let reading = draft.clone().into_reading(id);
        let value = serde_json::to_vec(&reading)?;
        let id_key = id.to_be_bytes().to_vec();
        let s_key = stream_key(&reading.stream, reading.timestamp, id);
        let t_key = time_key(reading.timestamp, id);

        let result: sled::transaction::TransactionResult<()> =
            (&self.readings, &self.by_stream, &self.by_time).transaction(
                |(readings, by_stream, by_time)| {
                    readings.insert(id_key.clone(), value.clone())?;
                    by_stream.insert(s_key.clone(), Vec::new())?;
                    by_time.insert(t_key.clone(), Vec::new())?;
                    Ok(())
                },
            );
        result.map_err(|e| StorageError::Database(format!("{e:?}")))?;

        debug!(id, stream = %reading.stream, "Stored reading");
        Ok(id)
    }

    async fn get(&self, id: ReadingId) -> Result<Option<Reading>, StorageError> {
        self.load(id)
    }

    async fn latest(
        &self,
        stream: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError> {
        match stream {
            Some(name) => self.resolve(self.by_stream.scan_prefix(stream_prefix(name)).rev().take(limit)),
            None => self.resolve(self.by_time.iter().rev().take(limit)),
        }
    }

    async fn since(
        &self,
        stream: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        match stream {
            Some(name) => {
                let start = stream_key(name, since, 0);
                let mut end = name.as_bytes().to_vec();
                end.push(STREAM_SEPARATOR + 1);
                self.resolve(self.by_stream.range(start..end))
            }
            None => self.resolve(self.by_time.range(time_key(since, 0)..)),
        }
    }

    async fn update_annotation(
        &self,
        id: ReadingId,
        is_anomaly: bool,
        score: f64,
    ) -> Result<AnnotationUpdate, StorageError> {
        let Some(mut reading) = self.load(id)? else {
            return Ok(AnnotationUpdate::NotFound);
        };
        reading.is_anomaly = Some(is_anomaly);
        reading.anomaly_score = Some(score);
        self.readings
            .insert(id.to_be_bytes(), serde_json::to_vec(&reading)?)?;
        Ok(AnnotationUpdate::Updated)
    }

    async fn count(&self, stream: Option<&str>) -> Result<usize, StorageError> {
        match stream {
            Some(name) => Ok(self.by_stream.scan_prefix(stream_prefix(name)).count()),
            None => Ok(self.readings.len()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn draft(stream: &str, ts: DateTime<Utc>, power: f64) -> ReadingDraft {
        ReadingDraft {
            stream: stream.to_string(),
            timestamp: ts,
            voltage: 230.0,
            current: power / 230.0,
            power,
            energy: crate::types::energy_from_power(power),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_bytes_sort_chronologically() {
        let before_epoch = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert!(time_bytes(before_epoch) < time_bytes(t0()));
        assert!(time_bytes(t0()) < time_bytes(t0() + Duration::nanoseconds(1)));
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let store = SledReadingStore::open_temporary().unwrap();
        let id = store.append(&draft("a", t0(), 100.0)).await.unwrap();

        let reading = store.get(id).await.unwrap().unwrap();
        assert_eq!(reading.power, 100.0);
        assert_eq!(reading.is_anomaly, Some(false));
        assert_eq!(reading.anomaly_score, None);
    }

    #[tokio::test]
    async fn test_latest_is_newest_first_per_stream() {
        let store = SledReadingStore::open_temporary().unwrap();
        for i in 0..5 {
            store
                .append(&draft("a", t0() + Duration::minutes(i), i as f64))
                .await
                .unwrap();
            store
                .append(&draft("b", t0() + Duration::minutes(i), 100.0 + i as f64))
                .await
                .unwrap();
        }

        let latest = store.latest(Some("a"), 3).await.unwrap();
        let powers: Vec<f64> = latest.iter().map(|r| r.power).collect();
        assert_eq!(powers, vec![4.0, 3.0, 2.0]);

        let all = store.latest(None, 2).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].timestamp, t0() + Duration::minutes(4));
    }

    #[tokio::test]
    async fn test_stream_prefix_does_not_leak() {
        let store = SledReadingStore::open_temporary().unwrap();
        store.append(&draft("meter", t0(), 1.0)).await.unwrap();
        store.append(&draft("meter2", t0(), 2.0)).await.unwrap();

        assert_eq!(store.count(Some("meter")).await.unwrap(), 1);
        let since = store.since(Some("meter"), t0()).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].power, 1.0);
    }

    #[tokio::test]
    async fn test_since_is_inclusive_and_ascending() {
        let store = SledReadingStore::open_temporary().unwrap();
        for i in 0..4 {
            store
                .append(&draft("a", t0() + Duration::hours(i), i as f64))
                .await
                .unwrap();
        }

        let rows = store.since(None, t0() + Duration::hours(1)).await.unwrap();
        let powers: Vec<f64> = rows.iter().map(|r| r.power).collect();
        assert_eq!(powers, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_duplicate_timestamps_kept() {
        let store = SledReadingStore::open_temporary().unwrap();
        store.append(&draft("a", t0(), 1.0)).await.unwrap();
        store.append(&draft("a", t0(), 2.0)).await.unwrap();
        assert_eq!(store.count(Some("a")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_annotation() {
        let store = SledReadingStore::open_temporary().unwrap();
        let id = store.append(&draft("a", t0(), 1.0)).await.unwrap();

        let outcome = store.update_annotation(id, true, -0.12).await.unwrap();
        assert_eq!(outcome, AnnotationUpdate::Updated);
        let reading = store.get(id).await.unwrap().unwrap();
        assert_eq!(reading.is_anomaly, Some(true));
        assert_eq!(reading.anomaly_score, Some(-0.12));

        let missing = store.update_annotation(id + 1000, true, 0.0).await.unwrap();
        assert_eq!(missing, AnnotationUpdate::NotFound);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.db");
        {
            let store = SledReadingStore::open(&path).unwrap();
            store.append(&draft("a", t0(), 42.0)).await.unwrap();
            store.flush().unwrap();
        }
        let store = SledReadingStore::open(&path).unwrap();
        let latest = store.latest(Some("a"), 1).await.unwrap();
        assert_eq!(latest[0].power, 42.0);
    }
}
