//! Fitted column transformer replayed at serving time
//!
//! The transformer is fitted offline and exported as JSON: an ordered list of
//! transformers, each owning a set of columns. Output columns are the
//! concatenation of every transformer's output, in order. Nothing here is
//! ever refit.

use crate::error::TransformError;
use crate::models::{EngineeredRecord, FeatureMatrix};
use serde::{Deserialize, Serialize};

/// Capability interface of a frozen preprocessing artifact
pub trait Preprocessor: Send + Sync {
    /// Transform engineered records into one fixed-width row each
    fn transform(&self, records: &[EngineeredRecord]) -> Result<FeatureMatrix, TransformError>;

    /// Number of output columns, when the artifact knows it up front
    fn output_width(&self) -> Option<usize> {
        None
    }
}

/// One fitted step of the column transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedTransformer {
    /// `(x - mean) / scale` per column
    StandardScaler {
        name: String,
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    /// One indicator column per known category; unknown categories encode
    /// as all zeros
    OneHot {
        name: String,
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
    },
    /// Numeric columns copied through unchanged
    Passthrough { name: String, columns: Vec<String> },
}

impl FittedTransformer {
    pub fn name(&self) -> &str {
        match self {
            FittedTransformer::StandardScaler { name, .. }
            | FittedTransformer::OneHot { name, .. }
            | FittedTransformer::Passthrough { name, .. } => name,
        }
    }

    fn width(&self) -> usize {
        match self {
            FittedTransformer::StandardScaler { columns, .. }
            | FittedTransformer::Passthrough { columns, .. } => columns.len(),
            FittedTransformer::OneHot { categories, .. } => categories.iter().map(Vec::len).sum(),
        }
    }

    fn check(&self) -> Result<(), TransformError> {
        let inconsistent = |reason: String| TransformError::Inconsistent {
            transformer: self.name().to_string(),
            reason,
        };
        match self {
            FittedTransformer::StandardScaler {
                columns,
                mean,
                scale,
                ..
            } => {
                if mean.len() != columns.len() || scale.len() != columns.len() {
                    return Err(inconsistent(format!(
                        "{} columns but {} means and {} scales",
                        columns.len(),
                        mean.len(),
                        scale.len()
                    )));
                }
                if let Some(i) = scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
                    return Err(inconsistent(format!(
                        "scale for `{}` is {}",
                        columns[i], scale[i]
                    )));
                }
            }
            FittedTransformer::OneHot {
                columns,
                categories,
                ..
            } => {
                if categories.len() != columns.len() {
                    return Err(inconsistent(format!(
                        "{} columns but {} category lists",
                        columns.len(),
                        categories.len()
                    )));
                }
            }
            FittedTransformer::Passthrough { .. } => {}
        }
        Ok(())
    }

    fn output_names(&self, out: &mut Vec<String>) {
        match self {
            FittedTransformer::StandardScaler { name, columns, .. }
            | FittedTransformer::Passthrough { name, columns } => {
                out.extend(columns.iter().map(|c| format!("{}__{}", name, c)));
            }
            FittedTransformer::OneHot {
                name,
                columns,
                categories,
            } => {
                for (column, cats) in columns.iter().zip(categories) {
                    out.extend(cats.iter().map(|c| format!("{}__{}_{}", name, column, c)));
                }
            }
        }
    }

    fn apply(
        &self,
        record: &EngineeredRecord,
        row_index: usize,
        row: &mut Vec<f64>,
    ) -> Result<(), TransformError> {
        let missing = |column: &str| TransformError::MissingColumn {
            transformer: self.name().to_string(),
            column: column.to_string(),
        };
        match self {
            FittedTransformer::StandardScaler {
                columns,
                mean,
                scale,
                ..
            } => {
                for ((column, mean), scale) in columns.iter().zip(mean).zip(scale) {
                    let x = record.numeric(column).ok_or_else(|| missing(column))?;
                    let scaled = (x - mean) / scale;
                    if !scaled.is_finite() {
                        return Err(TransformError::NonFinite {
                            transformer: self.name().to_string(),
                            column: column.clone(),
                            row: row_index,
                        });
                    }
                    row.push(scaled);
                }
            }
            FittedTransformer::Passthrough { columns, .. } => {
                for column in columns {
                    row.push(record.numeric(column).ok_or_else(|| missing(column))?);
                }
            }
            FittedTransformer::OneHot {
                columns,
                categories,
                ..
            } => {
                for (column, cats) in columns.iter().zip(categories) {
                    let value = record.categorical(column).ok_or_else(|| missing(column))?;
                    row.extend(cats.iter().map(|c| if c == value { 1.0 } else { 0.0 }));
                }
            }
        }
        Ok(())
    }
}

/// Column transformer loaded from `preprocessor.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransformer {
    pub transformers: Vec<FittedTransformer>,
}

impl ColumnTransformer {
    /// Build from fitted steps, rejecting internally inconsistent ones
    pub fn new(transformers: Vec<FittedTransformer>) -> Result<Self, TransformError> {
        let transformer = Self { transformers };
        transformer.check()?;
        Ok(transformer)
    }

    /// Parse the JSON export
    pub fn from_json(json: &str) -> Result<Self, String> {
        let transformer: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        transformer.check().map_err(|e| e.to_string())?;
        Ok(transformer)
    }

    pub fn check(&self) -> Result<(), TransformError> {
        self.transformers.iter().try_for_each(FittedTransformer::check)?;
        if self.width() == 0 {
            return Err(TransformError::Inconsistent {
                transformer: "column_transformer".to_string(),
                reason: "produces no output columns".to_string(),
            });
        }
        Ok(())
    }

    /// Output column names, `<transformer>__<column>[_<category>]`
    pub fn feature_names_out(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for transformer in &self.transformers {
            transformer.output_names(&mut names);
        }
        names
    }

    pub fn width(&self) -> usize {
        self.transformers.iter().map(FittedTransformer::width).sum()
    }
}

impl Preprocessor for ColumnTransformer {
    fn transform(&self, records: &[EngineeredRecord]) -> Result<FeatureMatrix, TransformError> {
        let width = self.width();
        let mut matrix = FeatureMatrix::with_width(width);
        let mut row = Vec::with_capacity(width);

        for (i, record) in records.iter().enumerate() {
            row.clear();
            for transformer in &self.transformers {
                transformer.apply(record, i, &mut row)?;
            }
            if !matrix.push_row(&row) {
                return Err(TransformError::Inconsistent {
                    transformer: "column_transformer".to_string(),
                    reason: format!("row {} has width {}, expected {}", i, row.len(), width),
                });
            }
        }

        Ok(matrix)
    }

    fn output_width(&self) -> Option<usize> {
        Some(self.width())
    }
}
