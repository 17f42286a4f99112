//! Ingestion Orchestrator
//!
//! Per reading:
//!
//! ```text
//! validate ─► append ─► read back last N ─► build features ─► score ─► annotate
//!                │              │                   │
//!                └ < 6 readings ┴── no eligible row ┴──► InsufficientHistory
//! ```
//!
//! Readings of one stream pass through this sequence one at a time, in
//! arrival order, so every score is computed from readings at or before the
//! scored one. Different streams run concurrently. Scoring problems never
//! fail an ingest: the stored reading is returned unscored instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::defaults::MIN_READINGS_FOR_SCORING;
use crate::config::{AnomalyConfig, IngestConfig};
use crate::ml_engine::{build_features, AnomalyScorer, AnomalyVerdict, PowerSample};
use crate::storage::{AnnotationUpdate, ReadingStore, StorageError};
use crate::types::{is_valid_stream_name, NewReading, Reading, ReadingDraft};

/// Ingest failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Rejected before anything was stored
    #[error("invalid reading: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Terminal state of one ingest.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Scored and annotated
    Scored {
        reading: Reading,
        verdict: AnomalyVerdict,
    },
    /// Not enough history for a complete feature row
    InsufficientHistory(Reading),
    /// Stored, but scoring or annotation failed
    Unscored { reading: Reading, reason: String },
}

impl IngestOutcome {
    pub fn reading(&self) -> &Reading {
        match self {
            Self::Scored { reading, .. }
            | Self::InsufficientHistory(reading)
            | Self::Unscored { reading, .. } => reading,
        }
    }

    pub fn into_reading(self) -> Reading {
        match self {
            Self::Scored { reading, .. }
            | Self::InsufficientHistory(reading)
            | Self::Unscored { reading, .. } => reading,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Scored { .. } => "scored",
            Self::InsufficientHistory(_) => "insufficient_history",
            Self::Unscored { .. } => "unscored",
        }
    }
}

/// Running totals since process start.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct IngestStats {
    pub ingested: u64,
    pub scored: u64,
    pub flagged: u64,
    pub insufficient_history: u64,
    pub unscored: u64,
    pub rejected: u64,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ingest: {} readings ({} scored, {} flagged, {} short history, {} unscored), {} rejected",
            self.ingested,
            self.scored,
            self.flagged,
            self.insufficient_history,
            self.unscored,
            self.rejected
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    ingested: AtomicU64,
    scored: AtomicU64,
    flagged: AtomicU64,
    insufficient_history: AtomicU64,
    unscored: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &IngestOutcome) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            IngestOutcome::Scored { verdict, .. } => {
                if verdict.is_anomaly {
                    self.flagged.fetch_add(1, Ordering::Relaxed);
                }
                &self.scored
            }
            IngestOutcome::InsufficientHistory(_) => &self.insufficient_history,
            IngestOutcome::Unscored { .. } => &self.unscored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            ingested: self.ingested.load(Ordering::Relaxed),
            scored: self.scored.load(Ordering::Relaxed),
            flagged: self.flagged.load(Ordering::Relaxed),
            insufficient_history: self.insufficient_history.load(Ordering::Relaxed),
            unscored: self.unscored.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Drives one reading from payload to annotated record.
pub struct IngestionOrchestrator {
    store: Arc<dyn ReadingStore>,
    scorer: AnomalyScorer,
    ingest: IngestConfig,
    anomaly: AnomalyConfig,
    /// One FIFO lock per stream, held for the whole sequence
    stream_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Counters,
}

impl IngestionOrchestrator {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        scorer: AnomalyScorer,
        ingest: IngestConfig,
        anomaly: AnomalyConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            ingest,
            anomaly,
            stream_locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReadingStore> {
        &self.store
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    #[cfg(test)]
    fn tracked_streams(&self) -> usize {
        self.stream_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn stream_lock(&self, stream: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .stream_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(stream.to_string()).or_default())
    }

    /// Ingest one reading and return it, annotated when possible.
    pub async fn ingest(&self, new: NewReading) -> Result<IngestOutcome, IngestError> {
        if let Err(e) = validate_payload(&new, Utc::now(), self.ingest.max_clock_skew()) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let stream = new.stream.clone();
        let lock = self.stream_lock(&stream);
        let result = {
            let _guard = lock.lock().await;
            self.ingest_locked(new).await
        };
        self.release_stream_lock(&stream, &lock);
        result
    }

    /// Forget a stream's lock once no other ingest holds or awaits it.
    fn release_stream_lock(&self, stream: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .stream_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and `lock` are the only owners left
        if Arc::strong_count(lock) == 2 {
            locks.remove(stream);
        }
    }

    async fn ingest_locked(&self, new: NewReading) -> Result<IngestOutcome, IngestError> {
        let latest = self.store.latest(Some(&new.stream), 1).await?;
        let latest_ts = latest.first().map(|r| r.timestamp);
        let timestamp = match (new.timestamp, latest_ts) {
            (Some(ts), Some(prev)) if ts < prev => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(IngestError::Validation(format!(
                    "timestamp {ts} is earlier than the latest reading of stream '{}' ({prev})",
                    new.stream
                )));
            }
            (Some(ts), _) => ts,
            // Server clock, never behind the stream
            (None, prev) => prev.map_or_else(Utc::now, |p| p.max(Utc::now())),
        };

        let draft = ReadingDraft::from_new(&new, timestamp);
        let id = self.store.append(&draft).await?;
        let reading = draft.into_reading(id);
        debug!(id, stream = %reading.stream, power = reading.power, "Reading stored");

        let outcome = self.score_and_annotate(reading).await?;
        self.counters.record(&outcome);
        Ok(outcome)
    }

    async fn score_and_annotate(&self, reading: Reading) -> Result<IngestOutcome, IngestError> {
        let mut window = self
            .store
            .latest(Some(&reading.stream), self.ingest.scoring_window)
            .await?;
        if window.len() < MIN_READINGS_FOR_SCORING {
            return Ok(IngestOutcome::InsufficientHistory(reading));
        }
        window.reverse();

        let samples: Vec<PowerSample> = window.iter().map(PowerSample::from).collect();
        let rows = build_features(&samples);
        if rows.is_empty() {
            return Ok(IngestOutcome::InsufficientHistory(reading));
        }

        let scorer = self.scorer.clone();
        let inference = tokio::task::spawn_blocking(move || scorer.score_latest(&rows));
        let verdict = match tokio::time::timeout(self.anomaly.inference_timeout(), inference).await
        {
            Ok(Ok(Some(verdict))) if verdict.score.is_finite() => verdict,
            Ok(Ok(Some(verdict))) => {
                return Ok(self.unscored(reading, format!("non-finite score {}", verdict.score)));
            }
            Ok(Ok(None)) => return Ok(IngestOutcome::InsufficientHistory(reading)),
            Ok(Err(e)) => return Ok(self.unscored(reading, format!("inference task failed: {e}"))),
            Err(_) => {
                return Ok(self.unscored(
                    reading,
                    format!(
                        "inference exceeded {} ms",
                        self.anomaly.inference_timeout_ms
                    ),
                ));
            }
        };

        match self
            .store
            .update_annotation(reading.id, verdict.is_anomaly, verdict.score)
            .await
        {
            Ok(AnnotationUpdate::Updated) => {}
            Ok(AnnotationUpdate::NotFound) => {
                return Ok(self.unscored(reading, "reading vanished before annotation".into()));
            }
            Err(e) => return Ok(self.unscored(reading, format!("annotation failed: {e}"))),
        }

        if verdict.is_anomaly {
            info!(
                id = reading.id,
                stream = %reading.stream,
                power = reading.power,
                score = verdict.score,
                "Anomalous reading"
            );
        }

        let reading = Reading {
            is_anomaly: Some(verdict.is_anomaly),
            anomaly_score: Some(verdict.score),
            ..reading
        };
        Ok(IngestOutcome::Scored { reading, verdict })
    }

    fn unscored(&self, reading: Reading, reason: String) -> IngestOutcome {
        warn!(id = reading.id, stream = %reading.stream, %reason, "Reading left unscored");
        IngestOutcome::Unscored { reading, reason }
    }
}

/// Reject payloads that must never reach the store.
///
/// A client timestamp may run ahead of `now` by at most `max_skew`.
pub fn validate_payload(
    new: &NewReading,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<(), IngestError> {
    if !is_valid_stream_name(&new.stream) {
        return Err(IngestError::Validation(format!(
            "stream name '{}' must be 1-64 characters of [A-Za-z0-9_.-]",
            new.stream
        )));
    }
    let bad = new.non_finite_fields();
    if !bad.is_empty() {
        return Err(IngestError::Validation(format!(
            "non-finite value for {}",
            bad.join(", ")
        )));
    }
    if let Some(ts) = new.timestamp {
        if ts > now + max_skew {
            return Err(IngestError::Validation(format!(
                "timestamp {ts} is more than {}s ahead of the server clock",
                max_skew.num_seconds()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::isolation_forest::{IsolationForest, IsolationTree, TreeNode};
    use crate::ml_engine::ScoringModel;
    use crate::storage::InMemoryReadingStore;
    use crate::types::ReadingId;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Flags power above 1000 W.
    fn spike_scorer() -> AnomalyScorer {
        AnomalyScorer::new(Arc::new(IsolationForest {
            n_features: 5,
            offset: -0.5,
            max_samples: 256,
            trees: vec![IsolationTree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 1000.0,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { n_samples: 255 },
                    TreeNode::Leaf { n_samples: 1 },
                ],
            }],
        }))
    }

    fn orchestrator() -> IngestionOrchestrator {
        IngestionOrchestrator::new(
            Arc::new(InMemoryReadingStore::new()),
            spike_scorer(),
            IngestConfig::default(),
            AnomalyConfig::default(),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    async fn feed(orch: &IngestionOrchestrator, powers: &[f64]) -> Vec<IngestOutcome> {
        let mut out = Vec::new();
        for (i, &p) in powers.iter().enumerate() {
            let new = NewReading::new(230.0, p / 230.0, p).at(t0() + Duration::minutes(i as i64));
            out.push(orch.ingest(new).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_first_five_are_insufficient_history() {
        let orch = orchestrator();
        let outcomes = feed(&orch, &[100.0; 5]).await;
        for o in &outcomes {
            assert!(matches!(o, IngestOutcome::InsufficientHistory(_)));
            assert_eq!(o.reading().is_anomaly, Some(false));
            assert!(o.reading().anomaly_score.is_none());
        }
        let stored = orch.store().latest(None, 10).await.unwrap();
        assert!(stored.iter().all(|r| !r.is_scored()));
    }

    #[tokio::test]
    async fn test_sixth_reading_is_scored_and_persisted() {
        let orch = orchestrator();
        let outcomes = feed(&orch, &[100.0, 100.0, 100.0, 100.0, 100.0, 5000.0]).await;
        let IngestOutcome::Scored { reading, verdict } = &outcomes[5] else {
            panic!("expected scored, got {}", outcomes[5].status());
        };
        assert!(verdict.is_anomaly);
        assert_eq!(reading.anomaly_score, Some(verdict.score));

        let stored = orch.store().get(reading.id).await.unwrap().unwrap();
        assert_eq!(stored.is_anomaly, Some(true));
        assert_eq!(stored.anomaly_score, Some(verdict.score));
        assert!((stored.energy - 5000.0 / 1000.0 / 60.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_later_readings_do_not_rescore_earlier() {
        let orch = orchestrator();
        let outcomes = feed(&orch, &[100.0; 6]).await;
        let first_scored = outcomes[5].reading().clone();
        feed_more(&orch, 6, &[9000.0, 9000.0]).await;

        let stored = orch.store().get(first_scored.id).await.unwrap().unwrap();
        assert_eq!(stored.anomaly_score, first_scored.anomaly_score);
        assert_eq!(stored.is_anomaly, Some(false));
    }

    async fn feed_more(orch: &IngestionOrchestrator, offset: i64, powers: &[f64]) {
        for (i, &p) in powers.iter().enumerate() {
            let at = t0() + Duration::minutes(offset + i as i64);
            orch.ingest(NewReading::new(230.0, 1.0, p).at(at)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_non_finite_rejected_before_storage() {
        let orch = orchestrator();
        let err = orch
            .ingest(NewReading::new(230.0, f64::NAN, 100.0))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert_eq!(orch.store().count(None).await.unwrap(), 0);
        assert_eq!(orch.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_bad_stream_name_rejected() {
        let orch = orchestrator();
        let err = orch
            .ingest(NewReading::new(230.0, 1.0, 100.0).with_stream("bad stream"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_backdated_timestamp_rejected() {
        let orch = orchestrator();
        feed(&orch, &[100.0, 100.0]).await;
        let err = orch
            .ingest(NewReading::new(230.0, 1.0, 100.0).at(t0() - Duration::hours(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert_eq!(orch.store().count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let orch = orchestrator();
        feed(&orch, &[100.0; 5]).await;
        let other = orch
            .ingest(NewReading::new(230.0, 1.0, 100.0).with_stream("meter-2"))
            .await
            .unwrap();
        assert!(matches!(other, IngestOutcome::InsufficientHistory(_)));
    }

    #[tokio::test]
    async fn test_concurrent_same_stream_all_stored() {
        let orch = Arc::new(orchestrator());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.ingest(NewReading::new(230.0, 1.0, 200.0)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let stats = orch.stats();
        assert_eq!(stats.ingested, 20);
        assert_eq!(stats.insufficient_history, 5);
        assert_eq!(stats.scored, 15);
    }

    #[tokio::test]
    async fn test_stream_locks_pruned_after_ingest() {
        let orch = Arc::new(orchestrator());
        feed(&orch, &[100.0; 3]).await;
        assert_eq!(orch.tracked_streams(), 0);

        let mut handles = Vec::new();
        for i in 0..10 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                let new = NewReading::new(230.0, 1.0, 100.0).with_stream(format!("meter-{}", i % 3));
                orch.ingest(new).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(orch.tracked_streams(), 0);
    }

    #[test]
    fn test_future_timestamp_beyond_skew_rejected() {
        let now = t0();
        let skew = Duration::seconds(300);
        let ok = NewReading::new(230.0, 1.0, 100.0).at(now + Duration::seconds(299));
        assert!(validate_payload(&ok, now, skew).is_ok());

        let ahead = NewReading::new(230.0, 1.0, 100.0).at(now + Duration::seconds(301));
        assert!(matches!(
            validate_payload(&ahead, now, skew),
            Err(IngestError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_far_future_reading_does_not_pin_stream() {
        let orch = orchestrator();
        let far = Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap();
        let err = orch
            .ingest(NewReading::new(230.0, 1.0, 100.0).at(far))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert_eq!(orch.stats().rejected, 1);

        let before = Utc::now();
        let outcome = orch.ingest(NewReading::new(230.0, 1.0, 100.0)).await.unwrap();
        let ts = outcome.reading().timestamp;
        assert!(ts >= before && ts <= Utc::now());
    }

    // ------------------------------------------------------------------
    // Degraded scoring: the reading is stored and returned unscored
    // ------------------------------------------------------------------

    #[derive(Debug)]
    enum Misbehaviour {
        Slow,
        NanScore,
        Panics,
    }

    #[derive(Debug)]
    struct BrokenModel(Misbehaviour);

    impl ScoringModel for BrokenModel {
        fn n_features(&self) -> usize {
            5
        }

        fn predict(&self, _features: &[f64]) -> f64 {
            match self.0 {
                Misbehaviour::Slow => {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    1.0
                }
                Misbehaviour::NanScore => 1.0,
                Misbehaviour::Panics => panic!("model exploded"),
            }
        }

        fn decision_function(&self, _features: &[f64]) -> f64 {
            match self.0 {
                Misbehaviour::NanScore => f64::NAN,
                _ => 0.1,
            }
        }

        fn kind(&self) -> &'static str {
            "broken"
        }
    }

    /// Delegates to memory, answering annotation writes with a fixed result.
    struct AnnotationFails {
        inner: InMemoryReadingStore,
        not_found: bool,
    }

    #[async_trait]
    impl ReadingStore for AnnotationFails {
        async fn append(&self, draft: &ReadingDraft) -> Result<ReadingId, StorageError> {
            self.inner.append(draft).await
        }

        async fn get(&self, id: ReadingId) -> Result<Option<Reading>, StorageError> {
            self.inner.get(id).await
        }

        async fn latest(
            &self,
            stream: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Reading>, StorageError> {
            self.inner.latest(stream, limit).await
        }

        async fn since(
            &self,
            stream: Option<&str>,
            since: DateTime<Utc>,
        ) -> Result<Vec<Reading>, StorageError> {
            self.inner.since(stream, since).await
        }

        async fn update_annotation(
            &self,
            _id: ReadingId,
            _is_anomaly: bool,
            _score: f64,
        ) -> Result<AnnotationUpdate, StorageError> {
            if self.not_found {
                Ok(AnnotationUpdate::NotFound)
            } else {
                Err(StorageError::Database("write refused".into()))
            }
        }

        async fn count(&self, stream: Option<&str>) -> Result<usize, StorageError> {
            self.inner.count(stream).await
        }

        fn backend_name(&self) -> &'static str {
            "AnnotationFails"
        }
    }

    fn degraded(store: Arc<dyn ReadingStore>, scorer: AnomalyScorer) -> IngestionOrchestrator {
        IngestionOrchestrator::new(
            store,
            scorer,
            IngestConfig::default(),
            AnomalyConfig {
                inference_timeout_ms: 20,
            },
        )
    }

    /// Feed six readings; the sixth must come back unscored and stay so.
    async fn assert_sixth_unscored(orch: &IngestionOrchestrator, reason_part: &str) {
        let outcomes = feed(orch, &[100.0; 6]).await;
        let IngestOutcome::Unscored { reading, reason } = &outcomes[5] else {
            panic!("expected unscored, got {}", outcomes[5].status());
        };
        assert!(reason.contains(reason_part), "{reason}");
        assert!(!reading.is_scored());

        let stored = orch.store().get(reading.id).await.unwrap().unwrap();
        assert!(!stored.is_scored());
        assert_eq!(stored.is_anomaly, Some(false));

        let stats = orch.stats();
        assert_eq!(stats.ingested, 6);
        assert_eq!(stats.unscored, 1);
        assert_eq!(stats.scored, 0);
    }

    fn broken(m: Misbehaviour) -> AnomalyScorer {
        AnomalyScorer::new(Arc::new(BrokenModel(m)))
    }

    #[tokio::test]
    async fn test_inference_timeout_leaves_reading_unscored() {
        let orch = degraded(Arc::new(InMemoryReadingStore::new()), broken(Misbehaviour::Slow));
        assert_sixth_unscored(&orch, "exceeded 20 ms").await;
    }

    #[tokio::test]
    async fn test_non_finite_score_leaves_reading_unscored() {
        let orch = degraded(
            Arc::new(InMemoryReadingStore::new()),
            broken(Misbehaviour::NanScore),
        );
        assert_sixth_unscored(&orch, "non-finite").await;
    }

    #[tokio::test]
    async fn test_model_panic_leaves_reading_unscored() {
        let orch = degraded(Arc::new(InMemoryReadingStore::new()), broken(Misbehaviour::Panics));
        assert_sixth_unscored(&orch, "inference task failed").await;
    }

    #[tokio::test]
    async fn test_annotation_error_leaves_reading_unscored() {
        let store = AnnotationFails {
            inner: InMemoryReadingStore::new(),
            not_found: false,
        };
        let orch = degraded(Arc::new(store), spike_scorer());
        assert_sixth_unscored(&orch, "annotation failed").await;
    }

    #[tokio::test]
    async fn test_annotation_not_found_leaves_reading_unscored() {
        let store = AnnotationFails {
            inner: InMemoryReadingStore::new(),
            not_found: true,
        };
        let orch = degraded(Arc::new(store), spike_scorer());
        assert_sixth_unscored(&orch, "vanished").await;
    }
}
