//! Preprocessor adapter
//!
//! Runs the frozen preprocessor over engineered records and checks the
//! resulting width against the feature list recorded at training time.

use crate::artifacts::Preprocessor;
use crate::error::{FeatureWidthMismatch, PredictionError};
use crate::models::{EngineeredRecord, FeatureMatrix};

/// Transformed batch plus any width inconsistency that was tolerated
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub matrix: FeatureMatrix,
    /// Set when the width differs from the feature list and strict mode is off
    pub width_mismatch: Option<FeatureWidthMismatch>,
}

pub struct PreprocessorAdapter<'a> {
    preprocessor: &'a dyn Preprocessor,
    expected_features: Option<&'a [String]>,
    strict: bool,
}

impl<'a> PreprocessorAdapter<'a> {
    pub fn new(
        preprocessor: &'a dyn Preprocessor,
        expected_features: Option<&'a [String]>,
        strict: bool,
    ) -> Self {
        Self {
            preprocessor,
            expected_features,
            strict,
        }
    }

    /// Transform a batch. Without a feature list the width is not checked.
    pub fn transform(&self, records: &[EngineeredRecord]) -> Result<TransformOutcome, PredictionError> {
        let matrix = self.preprocessor.transform(records)?;

        let width_mismatch = self
            .expected_features
            .map(<[String]>::len)
            .filter(|expected| *expected != matrix.width())
            .map(|expected| FeatureWidthMismatch {
                expected,
                actual: matrix.width(),
            });

        match width_mismatch {
            Some(mismatch) if self.strict => Err(mismatch.into()),
            _ => Ok(TransformOutcome {
                matrix,
                width_mismatch,
            }),
        }
    }
}
