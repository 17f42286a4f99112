//! Linear regression evaluation for exported regressors.

use serde::{Deserialize, Serialize};

use super::model::{ModelLoadError, ScoringModel};

/// `intercept + Σ coefficients[i] · x[i]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    pub fn validate(&self) -> Result<(), ModelLoadError> {
        if self.coefficients.is_empty() {
            return Err(ModelLoadError::Invalid("no coefficients".to_string()));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelLoadError::Invalid("non-finite coefficient".to_string()));
        }
        Ok(())
    }
}

impl ScoringModel for LinearRegression {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    fn decision_function(&self, features: &[f64]) -> f64 {
        self.predict(features)
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}
