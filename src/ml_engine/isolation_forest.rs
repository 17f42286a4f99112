//! Isolation forest evaluation.
//!
//! Scores rows against a forest exported from a trained isolation-forest
//! model. Each tree is a flat, pre-order node array: split nodes send
//! `x[feature] <= threshold` left, leaves record how many training samples
//! reached them.
//!
//! Scoring follows the usual isolation-forest definitions:
//! - path length of a row = leaf depth + `c(n_samples at leaf)`
//! - `score_samples = -2^(-mean_path_length / c(max_samples))`
//! - `decision_function = score_samples - offset` (negative = outlier)
//! - `predict = -1` when the decision is negative, else `+1`

use serde::{Deserialize, Serialize};

use super::model::{ModelLoadError, ScoringModel};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` samples.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// One node of an isolation tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        n_samples: usize,
    },
}

/// A single isolation tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolationTree {
    pub nodes: Vec<TreeNode>,
}

impl IsolationTree {
    /// Depth of the leaf reached by `x`, plus the leaf's expected residual depth.
    fn path_length(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0usize;
        loop {
            match self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[feature] <= threshold { left } else { right };
                    depth += 1;
                }
                TreeNode::Leaf { n_samples } => {
                    return depth as f64 + average_path_length(n_samples);
                }
            }
        }
    }

    /// Children must point forward inside the array, which also rules out cycles.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } = *node
            {
                if feature >= n_features {
                    return Err(format!("node {i} splits on feature {feature} of {n_features}"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has non-finite threshold"));
                }
                for child in [left, right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has out-of-order child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serialized isolation forest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolationForest {
    pub n_features: usize,
    /// Subtracted from `score_samples`; -0.5 for an uncalibrated forest
    pub offset: f64,
    /// Samples drawn per tree at training time
    pub max_samples: usize,
    pub trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn validate(&self) -> Result<(), ModelLoadError> {
        if self.trees.is_empty() {
            return Err(ModelLoadError::Invalid("forest has no trees".to_string()));
        }
        if self.max_samples < 2 {
            return Err(ModelLoadError::Invalid(format!(
                "max_samples must be >= 2 (got {})",
                self.max_samples
            )));
        }
        if !self.offset.is_finite() {
            return Err(ModelLoadError::Invalid("non-finite offset".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| ModelLoadError::Invalid(format!("tree {t}: {e}")))?;
        }
        Ok(())
    }

    /// Raw anomaly score in [-1, 0); closer to -1 = more anomalous.
    pub fn score_samples(&self, x: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.path_length(x)).sum();
        let mean = total / self.trees.len() as f64;
        -(2f64.powf(-mean / average_path_length(self.max_samples)))
    }
}

impl ScoringModel for IsolationForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: &[f64]) -> f64 {
        if self.decision_function(features) < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    fn decision_function(&self, features: &[f64]) -> f64 {
        self.score_samples(features) - self.offset
    }

    fn kind(&self) -> &'static str {
        "isolation_forest"
    }
}
