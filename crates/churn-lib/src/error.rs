//! Error taxonomy for the prediction pipeline
//!
//! Every failure that reaches a caller carries a machine-readable kind
//! (`PredictionError::kind`) and a human-readable reason (its `Display`).

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Constraint a raw field failed to satisfy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum Constraint {
    /// Required field absent (or null / empty cell)
    Missing,
    /// Value has the wrong type for the field
    WrongType { expected: &'static str, found: String },
    /// Numeric value outside the declared inclusive range
    OutOfRange {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Categorical value not in the allowed set
    NotAllowed {
        value: String,
        allowed: Vec<&'static str>,
    },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Missing => write!(f, "required field is missing"),
            Constraint::WrongType { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            Constraint::OutOfRange { value, min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "{} is outside [{}, {}]", value, min, max),
                (Some(min), None) => write!(f, "{} is below the minimum {}", value, min),
                (None, Some(max)) => write!(f, "{} is above the maximum {}", value, max),
                (None, None) => write!(f, "{} is out of range", value),
            },
            Constraint::NotAllowed { value, allowed } => {
                write!(f, "{:?} is not one of {:?}", value, allowed)
            }
        }
    }
}

/// One offending field in one record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Position of the record in the request, for multi-record requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub field: &'static str,
    #[serde(flatten)]
    pub constraint: Constraint,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(record) = self.record {
            write!(f, "record {}: ", record)?;
        }
        write!(f, "`{}` {}", self.field, self.constraint)
    }
}

/// Malformed or out-of-range input, detected before any transformation
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(violation: FieldViolation) -> Self {
        Self {
            violations: vec![violation],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid input")?;
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, violation)?;
        }
        Ok(())
    }
}

/// A derived feature could not be computed to a finite value
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub struct ComputationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub feature: &'static str,
    pub reason: String,
}

impl fmt::Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot compute `{}`", self.feature)?;
        if let Some(record) = self.record {
            write!(f, " for record {}", record)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Transformed width differs from the width recorded at training time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[error("expected {expected} features, got {actual}")]
pub struct FeatureWidthMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// The frozen preprocessor could not transform the engineered records
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("column `{column}` required by transformer `{transformer}` is not available")]
    MissingColumn { transformer: String, column: String },
    #[error("transformer `{transformer}` is inconsistent: {reason}")]
    Inconsistent { transformer: String, reason: String },
    #[error("transformer `{transformer}` produced a non-finite value for column `{column}` at row {row}")]
    NonFinite {
        transformer: String,
        column: String,
        row: usize,
    },
}

/// The frozen classifier failed during prediction
#[derive(Debug, Clone, PartialEq, Error)]
#[error("classifier `{model}` failed: {reason}")]
pub struct InferenceError {
    pub model: String,
    pub reason: String,
}

impl InferenceError {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Tabular (CSV) input could not be read or written
#[derive(Debug, Error)]
pub enum TableError {
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column `{0}` already exists")]
    DuplicateColumn(String),
    #[error("column `{column}` has {found} values, table has {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("CSV output is not valid UTF-8")]
    Encoding,
}

/// An artifact slot failed to load
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact file {path} not found")]
    NotFound { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("checksum mismatch for {path}: expected {expected}, found {found}")]
    Checksum {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("invalid artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Request-level failure reported by the prediction orchestrator
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error("preprocessing failed: {0}")]
    Transform(#[from] TransformError),
    #[error("feature width mismatch: {0}")]
    FeatureWidthMismatch(#[from] FeatureWidthMismatch),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("failed to format results: {0}")]
    Formatting(String),
}

impl PredictionError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::ServiceUnavailable(_) => "service_unavailable",
            PredictionError::Validation(_) => "validation_error",
            PredictionError::Computation(_) => "computation_error",
            PredictionError::Transform(_) => "transform_error",
            PredictionError::FeatureWidthMismatch(_) => "feature_width_mismatch",
            PredictionError::Inference(_) => "inference_error",
            PredictionError::Formatting(_) => "formatting_error",
        }
    }
}

/// Pipeline state a request was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Readiness,
    Validating,
    Engineering,
    Transforming,
    Inferring,
    Formatting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Readiness => "readiness",
            Stage::Validating => "validating",
            Stage::Engineering => "engineering",
            Stage::Transforming => "transforming",
            Stage::Inferring => "inferring",
            Stage::Formatting => "formatting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal `failed(reason)` state of a request
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct PredictionFailure {
    pub stage: Stage,
    #[source]
    pub error: PredictionError,
}

impl PredictionFailure {
    pub fn new(stage: Stage, error: impl Into<PredictionError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    pub fn reason(&self) -> String {
        self.error.to_string()
    }

    /// Structured details for the caller, when the error carries any
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.error {
            PredictionError::Validation(e) => serde_json::to_value(&e.violations).ok(),
            PredictionError::Computation(e) => serde_json::to_value(e).ok(),
            PredictionError::FeatureWidthMismatch(e) => serde_json::to_value(e).ok(),
            _ => None,
        }
    }
}
