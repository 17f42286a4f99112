//! Pipeline Regression Tests
//!
//! Drives the ingestion orchestrator end to end against the sled reading
//! store in a temporary directory: scoring order, persisted annotations,
//! restart durability, and forecasting over what was stored.

use gridsense::ml_engine::isolation_forest::{IsolationForest, IsolationTree, TreeNode};
use gridsense::ml_engine::{
    build_features, AnomalyScorer, EnergySample, ForecastEngine, ForecastMode, LinearRegression,
    PowerSample, ScoringModel,
};
use gridsense::config::{AnomalyConfig, ForecastConfig, IngestConfig};
use gridsense::pipeline::{IngestOutcome, IngestionOrchestrator};
use gridsense::storage::{all_readings, ReadingStore, SledReadingStore};
use gridsense::types::NewReading;

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

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

fn orchestrator(store: Arc<SledReadingStore>) -> IngestionOrchestrator {
    IngestionOrchestrator::new(
        store,
        spike_scorer(),
        IngestConfig::default(),
        AnomalyConfig::default(),
    )
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 6, 0, 0).unwrap()
}

/// Sawtooth load with a spike every 20th minute.
fn power_at(i: i64) -> f64 {
    if i % 20 == 19 {
        3000.0
    } else {
        300.0 + (i % 7) as f64 * 10.0
    }
}

#[tokio::test]
async fn test_every_reading_after_fifth_is_scored_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledReadingStore::open(dir.path().join("readings.db")).unwrap());
    let orch = orchestrator(Arc::clone(&store));

    let mut flagged = Vec::new();
    for i in 0..120 {
        let new = NewReading::new(230.0, 1.3, power_at(i)).at(t0() + Duration::minutes(i));
        let outcome = orch.ingest(new).await.unwrap();
        match (&outcome, i < 5) {
            (IngestOutcome::InsufficientHistory(_), true) => {}
            (IngestOutcome::Scored { verdict, .. }, false) => {
                if verdict.is_anomaly {
                    flagged.push(i);
                }
            }
            (other, _) => panic!("reading {i}: unexpected {}", other.status()),
        }
    }
    assert_eq!(flagged, vec![19, 39, 59, 79, 99, 119]);

    let stored = all_readings(store.as_ref(), None).await.unwrap();
    assert_eq!(stored.len(), 120);
    assert!(stored[..5].iter().all(|r| !r.is_scored() && r.is_anomaly == Some(false)));
    assert!(stored[5..].iter().all(|r| r.is_scored()));
    assert_eq!(stored.iter().filter(|r| r.flagged()).count(), 6);
}

#[tokio::test]
async fn test_stored_score_matches_offline_recomputation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledReadingStore::open(dir.path().join("readings.db")).unwrap());
    let orch = orchestrator(Arc::clone(&store));

    for i in 0..30 {
        let new = NewReading::new(230.0, 1.3, power_at(i)).at(t0() + Duration::minutes(i));
        orch.ingest(new).await.unwrap();
    }

    // Recompute the score of reading #20 from the readings that preceded it
    let stored = all_readings(store.as_ref(), None).await.unwrap();
    let window: Vec<PowerSample> = stored[..=20].iter().map(PowerSample::from).collect();
    let rows = build_features(&window);
    let expected = spike_scorer().score_latest(&rows).unwrap();
    let stored_score = stored[20].anomaly_score.unwrap();
    assert!((stored_score - expected.score).abs() < 1e-12);
    assert_eq!(stored[20].is_anomaly, Some(expected.is_anomaly));
}

#[tokio::test]
async fn test_annotations_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.db");
    let scores: Vec<Option<f64>> = {
        let store = Arc::new(SledReadingStore::open(&path).unwrap());
        let orch = orchestrator(Arc::clone(&store));
        for i in 0..10 {
            let new = NewReading::new(230.0, 1.3, power_at(i)).at(t0() + Duration::minutes(i));
            orch.ingest(new).await.unwrap();
        }
        store.flush().unwrap();
        all_readings(store.as_ref(), None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.anomaly_score)
            .collect()
    };

    let reopened = SledReadingStore::open(&path).unwrap();
    let after: Vec<Option<f64>> = all_readings(&reopened, None)
        .await
        .unwrap()
        .iter()
        .map(|r| r.anomaly_score)
        .collect();
    assert_eq!(scores, after);
    assert_eq!(reopened.count(None).await.unwrap(), 10);
}

#[tokio::test]
async fn test_concurrent_streams_keep_per_stream_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledReadingStore::open(dir.path().join("readings.db")).unwrap());
    let orch = Arc::new(orchestrator(Arc::clone(&store)));

    let mut handles = Vec::new();
    for stream in ["feeder-1", "feeder-2", "feeder-3"] {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let new = NewReading::new(230.0, 1.0, power_at(i))
                    .with_stream(stream)
                    .at(t0() + Duration::minutes(i));
                orch.ingest(new).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    for stream in ["feeder-1", "feeder-2", "feeder-3"] {
        let readings = all_readings(store.as_ref(), Some(stream)).await.unwrap();
        assert_eq!(readings.len(), 25);
        assert!(readings.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(readings.iter().filter(|r| r.is_scored()).count(), 20);
        assert_eq!(readings.iter().filter(|r| r.flagged()).count(), 1);
    }
    assert_eq!(orch.stats().ingested, 75);
}

#[tokio::test]
async fn test_forecast_over_stored_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledReadingStore::open(dir.path().join("readings.db")).unwrap());
    let orch = orchestrator(Arc::clone(&store));
    // 6 hours at a steady 600 W, one reading per minute
    for i in 0..360 {
        let new = NewReading::new(230.0, 2.6, 600.0).at(t0() + Duration::minutes(i));
        orch.ingest(new).await.unwrap();
    }
    let history: Vec<EnergySample> = all_readings(store.as_ref(), None)
        .await
        .unwrap()
        .iter()
        .map(EnergySample::from)
        .collect();

    let model: Arc<dyn ScoringModel> =
        Arc::new(LinearRegression::new(vec![0.5, 0.5, 0.0, 0.0], 0.0));
    let engine = ForecastEngine::new(Some(model), ForecastConfig::default());
    assert_eq!(engine.mode(), ForecastMode::Model);

    let points = engine.forecast(&history, 6);
    assert_eq!(points.len(), 6);
    let last_bucket = t0() + Duration::hours(5);
    for (i, p) in points.iter().enumerate() {
        assert_eq!(p.timestamp, last_bucket + Duration::hours(i as i64 + 1));
        // 60 readings x 0.01 kWh per full hour, held steady by the model
        assert!((p.energy - 0.6).abs() < 1e-9, "step {i}: {}", p.energy);
    }

    let baseline = ForecastEngine::new(None, ForecastConfig::default()).forecast(&history, 2);
    assert_eq!(baseline[0].timestamp, t0() + Duration::minutes(359) + Duration::hours(1));
    assert!((baseline[0].energy - 0.01).abs() < 1e-12);
}
