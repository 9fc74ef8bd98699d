//! Inference engine
//!
//! Applies the frozen classifier to a feature matrix and maps raw class
//! labels and probabilities onto prediction results.

use crate::artifacts::Classifier;
use crate::error::InferenceError;
use crate::models::{ChurnLabel, ClassProbabilities, FeatureMatrix, PredictionResult};

/// Slack allowed on probabilities coming out of single-precision models
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Results for a batch, in row order
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub results: Vec<PredictionResult>,
    /// Whether the classifier produced probabilities
    pub probabilistic: bool,
}

impl Scored {
    pub fn churned(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.label == ChurnLabel::Churn)
            .count()
    }
}

pub struct InferenceEngine<'a> {
    classifier: &'a dyn Classifier,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(classifier: &'a dyn Classifier) -> Self {
        Self { classifier }
    }

    fn fail(&self, reason: impl Into<String>) -> InferenceError {
        InferenceError::new(self.classifier.name(), reason)
    }

    pub fn run(&self, features: &FeatureMatrix) -> Result<Scored, InferenceError> {
        let rows = features.n_rows();

        let (labels, probabilities) = self.classifier.predict_with_proba(features)?;
        if labels.len() != rows {
            return Err(self.fail(format!(
                "returned {} labels for {} rows",
                labels.len(),
                rows
            )));
        }

        let probabilities = match probabilities {
            Some(probs) if probs.len() != rows => {
                return Err(self.fail(format!(
                    "returned {} probability pairs for {} rows",
                    probs.len(),
                    rows
                )))
            }
            Some(probs) => Some(
                probs
                    .iter()
                    .enumerate()
                    .map(|(row, [p0, p1])| {
                        Ok(ClassProbabilities {
                            non_churn: self.probability(row, *p0)?,
                            churn: self.probability(row, *p1)?,
                        })
                    })
                    .collect::<Result<Vec<_>, InferenceError>>()?,
            ),
            None => None,
        };

        let results = labels
            .into_iter()
            .enumerate()
            .map(|(row, class)| {
                let label = ChurnLabel::from_class(class)
                    .ok_or_else(|| self.fail(format!("unexpected class label {} at row {}", class, row)))?;
                Ok(PredictionResult {
                    label,
                    probabilities: probabilities.as_ref().map(|p| p[row]),
                })
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        Ok(Scored {
            results,
            probabilistic: probabilities.is_some(),
        })
    }

    fn probability(&self, row: usize, p: f64) -> Result<f64, InferenceError> {
        let valid = -PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE;
        if !p.is_finite() || !valid.contains(&p) {
            return Err(self.fail(format!("probability {} at row {} is outside [0, 1]", p, row)));
        }
        Ok(p.clamp(0.0, 1.0))
    }
}
