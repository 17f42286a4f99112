//! Anomaly Scorer: runs the loaded outlier model on one feature vector.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::ScoringModel;
use crate::config::defaults::ANOMALY_LABEL;
use crate::types::FeatureVector;

/// Result of scoring one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Raw `decision_function` output; lower = more anomalous
    pub score: f64,
}

/// Stateless scorer around a shared, read-only model.
///
/// Only constructible with a model in hand: a missing anomaly model is a
/// startup fault and never reaches this type.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    model: Arc<dyn ScoringModel>,
}

impl AnomalyScorer {
    pub fn new(model: Arc<dyn ScoringModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn ScoringModel> {
        &self.model
    }

    /// Score a single feature vector. The label convention (-1 = anomaly)
    /// comes from the artifact and the score is passed through unchanged.
    pub fn score(&self, features: &FeatureVector) -> AnomalyVerdict {
        let row = features.to_array();
        let label = self.model.predict(&row);
        let score = self.model.decision_function(&row);
        AnomalyVerdict {
            is_anomaly: label == ANOMALY_LABEL,
            score,
        }
    }

    /// Score the most recent eligible row, if any.
    pub fn score_latest(&self, rows: &[FeatureVector]) -> Option<AnomalyVerdict> {
        rows.last().map(|row| self.score(row))
    }
}
