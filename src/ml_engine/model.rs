//! Scoring model capability and artifact loading.
//!
//! A trained model reaches the process as a versioned JSON artifact. Loading
//! it yields a three-state [`ModelLoad`]: callers decide what `Absent` and
//! `Corrupt` mean for them (the anomaly path refuses to start, the forecast
//! path falls back to its baseline).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::isolation_forest::IsolationForest;
use super::linear::LinearRegression;
use crate::config::defaults::MODEL_ARTIFACT_VERSION;

/// Read-only inference capability shared across requests.
///
/// Implementations hold no interior mutability, so concurrent calls need
/// no locking. Inputs are in the consumer's fixed feature order and have
/// exactly [`ScoringModel::n_features`] columns.
pub trait ScoringModel: Send + Sync + fmt::Debug {
    /// Input width this model was trained on.
    fn n_features(&self) -> usize;

    /// Label (classifiers) or value (regressors) for one row.
    fn predict(&self, features: &[f64]) -> f64;

    /// Continuous score for one row; for outlier models lower = more anomalous.
    fn decision_function(&self, features: &[f64]) -> f64;

    /// Short model family name for logs.
    fn kind(&self) -> &'static str;
}

/// Errors that make an artifact unusable.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("cannot read artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported artifact version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("artifact takes {found} features, consumer supplies {expected}")]
    FeatureCount { expected: usize, found: usize },
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Model payload, tagged by family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    IsolationForest(IsolationForest),
    Linear(LinearRegression),
}

impl ModelSpec {
    fn validate(&self) -> Result<(), ModelLoadError> {
        match self {
            Self::IsolationForest(m) => m.validate(),
            Self::Linear(m) => m.validate(),
        }
    }

    fn into_model(self) -> Arc<dyn ScoringModel> {
        match self {
            Self::IsolationForest(m) => Arc::new(m),
            Self::Linear(m) => Arc::new(m),
        }
    }
}

/// On-disk model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Format version for forward compatibility.
    pub version: u32,
    /// Free-form model name, for logs.
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub model: ModelSpec,
}

impl ModelArtifact {
    pub fn new(name: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            version: MODEL_ARTIFACT_VERSION,
            name: name.into(),
            model,
        }
    }

    /// Parse and validate an artifact against the consumer's input width.
    pub fn decode(bytes: &[u8], expected_features: usize) -> Result<Self, ModelLoadError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        if artifact.version != MODEL_ARTIFACT_VERSION {
            return Err(ModelLoadError::Version {
                found: artifact.version,
                expected: MODEL_ARTIFACT_VERSION,
            });
        }
        artifact.model.validate()?;
        let found = match &artifact.model {
            ModelSpec::IsolationForest(m) => m.n_features(),
            ModelSpec::Linear(m) => m.n_features(),
        };
        if found != expected_features {
            return Err(ModelLoadError::FeatureCount {
                expected: expected_features,
                found,
            });
        }
        Ok(artifact)
    }

    /// Save atomically (write temp file, then rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)
    }
}

/// Outcome of loading one artifact at process start.
#[derive(Debug, Clone)]
pub enum ModelLoad {
    Loaded(Arc<dyn ScoringModel>),
    /// No artifact at the path
    Absent(PathBuf),
    /// An artifact exists but cannot be used
    Corrupt { path: PathBuf, reason: Arc<ModelLoadError> },
}

impl ModelLoad {
    /// The loaded model, if any.
    pub fn model(&self) -> Option<Arc<dyn ScoringModel>> {
        match self {
            Self::Loaded(m) => Some(Arc::clone(m)),
            Self::Absent(_) | Self::Corrupt { .. } => None,
        }
    }
}

impl fmt::Display for ModelLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(m) => write!(f, "loaded ({}, {} features)", m.kind(), m.n_features()),
            Self::Absent(path) => write!(f, "absent ({})", path.display()),
            Self::Corrupt { path, reason } => write!(f, "corrupt ({}): {}", path.display(), reason),
        }
    }
}

/// Load the artifact at `path` for a consumer with `expected_features` inputs.
///
/// A missing file is `Absent`; every other failure is `Corrupt`.
pub fn load_model(path: &Path, expected_features: usize) -> ModelLoad {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ModelLoad::Absent(path.to_path_buf());
        }
        Err(e) => {
            return ModelLoad::Corrupt {
                path: path.to_path_buf(),
                reason: Arc::new(e.into()),
            };
        }
    };

    match ModelArtifact::decode(&bytes, expected_features) {
        Ok(artifact) => {
            tracing::debug!(name = %artifact.name, path = %path.display(), "Decoded model artifact");
            ModelLoad::Loaded(artifact.model.into_model())
        }
        Err(e) => ModelLoad::Corrupt {
            path: path.to_path_buf(),
            reason: Arc::new(e),
        },
    }
}
