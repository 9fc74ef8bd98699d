//! ONNX classifier inference using tract
//!
//! Runs a classifier exported to ONNX (for example with `skl2onnx`,
//! `zipmap=False`). Output 0 holds the class label; output 1, when present,
//! holds the `[n, 2]` class probabilities.

use super::classifier::{Classifier, LabelsAndProbabilities};
use crate::error::InferenceError;
use crate::models::FeatureMatrix;
use anyhow::{Context, Result};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Batch latency above which a warning is logged
const SLOW_BATCH_MS: u128 = 250;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-backed classifier
///
/// The plan is compiled for a single `[1, width]` row, so batches are run
/// row by row and batch results match single-record results exactly.
pub struct OnnxClassifier {
    name: String,
    plan: TractModel,
    width: usize,
    has_probabilities: bool,
}

impl OnnxClassifier {
    /// Load and optimize an ONNX model from bytes
    pub fn from_bytes(name: impl Into<String>, model_bytes: &[u8], width: usize) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, width]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?;

        let outputs = model
            .output_outlets()
            .context("Failed to read model outputs")?
            .len();
        let plan = model
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            name: name.into(),
            plan,
            width,
            has_probabilities: outputs >= 2,
        })
    }

    pub fn input_width(&self) -> usize {
        self.width
    }

    fn fail(&self, reason: impl Into<String>) -> InferenceError {
        InferenceError::new(&self.name, reason)
    }

    fn run_row(&self, row: &[f64]) -> Result<(i64, Option<[f64; 2]>), InferenceError> {
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.width), data)
            .map_err(|e| self.fail(format!("bad input row: {}", e)))?
            .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| self.fail(format!("{:#}", e)))?;

        let label = outputs
            .first()
            .ok_or_else(|| self.fail("no label output"))?
            .cast_to::<i64>()
            .map_err(|e| self.fail(format!("label output: {:#}", e)))?
            .as_slice::<i64>()
            .map_err(|e| self.fail(format!("label output: {:#}", e)))?
            .first()
            .copied()
            .ok_or_else(|| self.fail("empty label output"))?;

        let probabilities = match outputs.get(1) {
            Some(tensor) if self.has_probabilities => {
                let probs = tensor
                    .cast_to::<f32>()
                    .map_err(|e| self.fail(format!("probability output: {:#}", e)))?;
                let probs = probs
                    .as_slice::<f32>()
                    .map_err(|e| self.fail(format!("probability output: {:#}", e)))?;
                match probs {
                    [p0, p1, ..] => Some([*p0 as f64, *p1 as f64]),
                    _ => return Err(self.fail("probability output has fewer than 2 classes")),
                }
            }
            _ => None,
        };

        Ok((label, probabilities))
    }

    fn run(&self, features: &FeatureMatrix) -> Result<Vec<(i64, Option<[f64; 2]>)>, InferenceError> {
        if features.width() != self.width {
            return Err(self.fail(format!(
                "expected {} input features, got {}",
                self.width,
                features.width()
            )));
        }

        let start = Instant::now();
        let results = features
            .rows()
            .take(features.n_rows())
            .map(|row| self.run_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_BATCH_MS {
            warn!(
                model = %self.name,
                rows = results.len(),
                elapsed_ms = elapsed.as_millis(),
                "ONNX inference exceeded {}ms",
                SLOW_BATCH_MS
            );
        } else {
            debug!(model = %self.name, rows = results.len(), elapsed_us = elapsed.as_micros(), "ONNX inference completed");
        }

        Ok(results)
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>, InferenceError> {
        Ok(self.run(features)?.into_iter().map(|(label, _)| label).collect())
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Option<Vec<[f64; 2]>>, InferenceError> {
        Ok(self.predict_with_proba(features)?.1)
    }

    fn predict_with_proba(&self, features: &FeatureMatrix) -> Result<LabelsAndProbabilities, InferenceError> {
        let rows = self.run(features)?;
        let mut labels = Vec::with_capacity(rows.len());
        let mut probabilities = Vec::with_capacity(rows.len());
        for (label, probs) in rows {
            labels.push(label);
            if self.has_probabilities {
                probabilities.push(probs.ok_or_else(|| self.fail("probability output missing"))?);
            }
        }
        Ok((labels, self.has_probabilities.then_some(probabilities)))
    }
}
