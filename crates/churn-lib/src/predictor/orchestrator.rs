//! Prediction orchestrator
//!
//! Composes validation, feature engineering, preprocessing and inference
//! into the single, batch and table entry points. Each request walks
//! `validating -> engineering -> transforming -> inferring -> formatting`;
//! the first failing stage ends the request with a [`PredictionFailure`].

use super::inference::{InferenceEngine, Scored};
use super::output::OutputFormatter;
use super::preprocess::PreprocessorAdapter;
use super::{FeatureEngineer, SchemaValidator};
use crate::artifacts::{ArtifactBundle, ArtifactSlot};
use crate::error::{PredictionError, PredictionFailure, Stage};
use crate::health::{HealthReport, Readiness};
use crate::models::{IndexedPrediction, ModelMetadata, PredictionResult, RawInput};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Pipeline behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fail requests whose transformed width differs from the feature list
    /// instead of logging and continuing
    #[serde(default)]
    pub strict_feature_width: bool,
}

/// Request shape, used as a metrics and log label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    Single,
    Batch,
    Table,
}

impl RequestShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestShape::Single => "single",
            RequestShape::Batch => "batch",
            RequestShape::Table => "table",
        }
    }
}

/// Serves churn predictions from a loaded artifact bundle
///
/// Holds no mutable state; share it behind an `Arc` across request handlers.
pub struct ChurnPredictor {
    bundle: Arc<ArtifactBundle>,
    config: PipelineConfig,
    validator: SchemaValidator,
    engineer: FeatureEngineer,
    formatter: OutputFormatter,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl ChurnPredictor {
    pub fn new(bundle: Arc<ArtifactBundle>, config: PipelineConfig) -> Self {
        let metrics = ServiceMetrics::new();
        for slot in ArtifactSlot::ALL {
            metrics.set_artifact_loaded(slot.as_str(), bundle.is_loaded(slot));
        }
        Self {
            bundle,
            config,
            validator: SchemaValidator::new(),
            engineer: FeatureEngineer::new(),
            formatter: OutputFormatter::new(),
            metrics,
            logger: StructuredLogger::new(env!("CARGO_PKG_NAME")),
        }
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score one record
    pub fn predict_one(&self, input: &RawInput) -> Result<PredictionResult, PredictionFailure> {
        self.serve(RequestShape::Single, std::slice::from_ref(input), |scored| {
            scored.results.into_iter().next().ok_or_else(|| {
                PredictionError::Formatting("classifier returned no result".to_string())
            })
        })
    }

    /// Score an ordered list of records in one pass; results keep input order
    /// and carry their input index
    pub fn predict_many(&self, inputs: &[RawInput]) -> Result<Vec<IndexedPrediction>, PredictionFailure> {
        if inputs.is_empty() {
            self.ensure_ready()?;
            return Ok(Vec::new());
        }
        self.serve(RequestShape::Batch, inputs, |scored| Ok(self.formatter.indexed(scored)))
    }

    /// Score every row of a table; returns the table with the prediction
    /// columns appended and row order preserved
    pub fn predict_table(&self, table: &Table) -> Result<Table, PredictionFailure> {
        self.serve(RequestShape::Table, &table.to_raw_inputs(), |scored| {
            self.formatter
                .append_to_table(table, &scored)
                .map_err(|e| PredictionError::Formatting(e.to_string()))
        })
    }

    pub fn is_ready(&self) -> Readiness {
        Readiness::from_bundle(&self.bundle)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::from_bundle(&self.bundle)
    }

    /// Metadata bundled with the model, unmodified
    pub fn model_metadata(&self) -> Option<&ModelMetadata> {
        self.bundle.metadata()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.bundle.feature_names()
    }

    /// Refuse work while a required artifact is missing
    pub fn ensure_ready(&self) -> Result<(), PredictionFailure> {
        if self.bundle.is_degraded() {
            let missing: Vec<&str> = self
                .bundle
                .missing_required()
                .iter()
                .map(|s| s.as_str())
                .collect();
            return Err(PredictionFailure::new(
                Stage::Readiness,
                PredictionError::ServiceUnavailable(format!(
                    "model artifacts not loaded: {}",
                    missing.join(", ")
                )),
            ));
        }
        Ok(())
    }

    /// Run the pipeline and the formatting step with timing, metrics and
    /// logging around them; a request counts as served only once formatted
    fn serve<T>(
        &self,
        shape: RequestShape,
        inputs: &[RawInput],
        format: impl FnOnce(Scored) -> Result<T, PredictionError>,
    ) -> Result<T, PredictionFailure> {
        let start = Instant::now();
        self.metrics.inc_requests(shape.as_str());

        let result = self.run(shape, inputs).and_then(|scored| {
            let (rows, churned) = (scored.results.len(), scored.churned());
            format(scored)
                .map(|out| (out, rows, churned))
                .map_err(|e| PredictionFailure::new(Stage::Formatting, e))
        });
        let (out, rows, churned) = result.map_err(|failure| {
            self.record_failure(shape, &failure);
            failure
        })?;

        let elapsed = start.elapsed();
        self.metrics.observe_latency(shape.as_str(), elapsed.as_secs_f64());
        self.metrics.add_rows_scored(rows);
        self.logger
            .log_prediction(shape.as_str(), rows, churned, elapsed.as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn run(&self, shape: RequestShape, inputs: &[RawInput]) -> Result<Scored, PredictionFailure> {
        self.ensure_ready()?;
        let (Some(classifier), Some(preprocessor)) =
            (self.bundle.classifier(), self.bundle.preprocessor())
        else {
            return Err(PredictionFailure::new(
                Stage::Readiness,
                PredictionError::ServiceUnavailable("model artifacts not loaded".to_string()),
            ));
        };

        // single requests report violations without a record index
        let records = match shape {
            RequestShape::Single => inputs
                .iter()
                .map(|input| self.validator.validate(input))
                .collect(),
            RequestShape::Batch | RequestShape::Table => self.validator.validate_all(inputs),
        }
        .map_err(|e| PredictionFailure::new(Stage::Validating, e))?;

        let engineered = match shape {
            RequestShape::Single => records
                .iter()
                .map(|record| self.engineer.engineer(record))
                .collect(),
            RequestShape::Batch | RequestShape::Table => self.engineer.engineer_all(&records),
        }
        .map_err(|e| PredictionFailure::new(Stage::Engineering, e))?;

        let outcome = PreprocessorAdapter::new(
            preprocessor,
            self.bundle.feature_names(),
            self.config.strict_feature_width,
        )
        .transform(&engineered);

        let outcome = match outcome {
            Ok(outcome) => {
                if let Some(mismatch) = outcome.width_mismatch {
                    self.metrics.inc_feature_width_mismatches();
                    self.logger
                        .log_feature_width_mismatch(mismatch.expected, mismatch.actual, false);
                }
                outcome
            }
            Err(PredictionError::FeatureWidthMismatch(mismatch)) => {
                self.metrics.inc_feature_width_mismatches();
                self.logger
                    .log_feature_width_mismatch(mismatch.expected, mismatch.actual, true);
                return Err(PredictionFailure::new(Stage::Transforming, mismatch));
            }
            Err(e) => return Err(PredictionFailure::new(Stage::Transforming, e)),
        };

        InferenceEngine::new(classifier)
            .run(&outcome.matrix)
            .map_err(|e| PredictionFailure::new(Stage::Inferring, e))
    }

    fn record_failure(&self, shape: RequestShape, failure: &PredictionFailure) {
        self.metrics.inc_failures(failure.kind());
        self.logger.log_prediction_failed(
            shape.as_str(),
            failure.stage.as_str(),
            failure.kind(),
            &failure.reason(),
        );
    }
}
