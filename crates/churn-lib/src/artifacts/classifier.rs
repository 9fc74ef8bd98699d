//! Classifier capability and the JSON logistic-regression artifact

use crate::error::InferenceError;
use crate::models::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Capability interface of a frozen classifier artifact
pub trait Classifier: Send + Sync {
    /// Human-readable model identifier used in logs and errors
    fn name(&self) -> &str;

    /// One class label per matrix row
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>, InferenceError>;

    /// `[p(class 0), p(class 1)]` per row, or `None` when the model has no
    /// probabilistic output
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Option<Vec<[f64; 2]>>, InferenceError> {
        let _ = features;
        Ok(None)
    }

    /// Labels and probabilities together; models that produce both from one
    /// evaluation override this to avoid running twice
    fn predict_with_proba(&self, features: &FeatureMatrix) -> Result<LabelsAndProbabilities, InferenceError> {
        Ok((self.predict(features)?, self.predict_proba(features)?))
    }
}

/// Class labels per row, with `[p(class 0), p(class 1)]` per row when available
pub type LabelsAndProbabilities = (Vec<i64>, Option<Vec<[f64; 2]>>);

/// Binary logistic regression exported as JSON (`classifier.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    #[serde(default = "default_name")]
    pub name: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Probability at or above which class 1 is predicted
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Whether probabilities are exposed to callers
    #[serde(default = "default_probability")]
    pub probability: bool,
}

fn default_name() -> String {
    "logistic_regression".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_probability() -> bool {
    true
}

/// Tagged wrapper matching the `kind` field of the JSON export
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ClassifierExport {
    LogisticRegression(LogisticClassifier),
}

impl LogisticClassifier {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            name: default_name(),
            coefficients,
            intercept,
            threshold: default_threshold(),
            probability: default_probability(),
        }
    }

    pub fn without_probabilities(mut self) -> Self {
        self.probability = false;
        self
    }

    /// Parse the JSON export
    pub fn from_json(json: &str) -> Result<Self, String> {
        let ClassifierExport::LogisticRegression(model) =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        if !model.intercept.is_finite() || model.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("coefficients must be finite".to_string());
        }
        if !(0.0..=1.0).contains(&model.threshold) {
            return Err(format!("threshold {} is outside [0, 1]", model.threshold));
        }
        Ok(model)
    }

    pub fn input_width(&self) -> usize {
        self.coefficients.len()
    }

    fn churn_probability(&self, row: &[f64]) -> f64 {
        let z: f64 = self
            .coefficients
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }

    fn check_width(&self, features: &FeatureMatrix) -> Result<(), InferenceError> {
        if features.width() != self.coefficients.len() {
            return Err(InferenceError::new(
                &self.name,
                format!(
                    "expected {} input features, got {}",
                    self.coefficients.len(),
                    features.width()
                ),
            ));
        }
        Ok(())
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>, InferenceError> {
        self.check_width(features)?;
        Ok(features
            .rows()
            .take(features.n_rows())
            .map(|row| i64::from(self.churn_probability(row) >= self.threshold))
            .collect())
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Option<Vec<[f64; 2]>>, InferenceError> {
        if !self.probability {
            return Ok(None);
        }
        self.check_width(features)?;
        Ok(Some(
            features
                .rows()
                .take(features.n_rows())
                .map(|row| {
                    let p = self.churn_probability(row);
                    [1.0 - p, p]
                })
                .collect(),
        ))
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
