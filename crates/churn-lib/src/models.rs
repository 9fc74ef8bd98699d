//! Core data models for the churn prediction service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw request payload for one customer: field name to JSON value.
///
/// JSON bodies deserialize straight into this; CSV rows are converted into it
/// with every cell as a string. Field names are matched case-insensitively.
pub type RawInput = serde_json::Map<String, serde_json::Value>;

/// Free-form metadata bundled with the trained model
pub type ModelMetadata = serde_json::Map<String, serde_json::Value>;

/// Validated customer attributes, as accepted by the schema validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCustomerRecord {
    pub customer_age: u32,
    pub gender: String,
    pub dependent_count: u32,
    pub education_level: String,
    pub marital_status: String,
    pub income_category: String,
    pub card_category: String,
    pub months_on_book: u32,
    pub total_relationship_count: u32,
    pub months_inactive_12_mon: u32,
    pub contacts_count_12_mon: u32,
    pub credit_limit: f64,
    pub total_revolving_bal: u32,
    pub avg_open_to_buy: f64,
    pub total_amt_chng_q4_q1: f64,
    pub total_trans_amt: u32,
    pub total_trans_ct: u32,
    pub total_ct_chng_q4_q1: f64,
    pub avg_utilization_ratio: f64,
}

/// Customer record plus the derived ratio features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredRecord {
    /// Raw attributes with categorical sentinels already canonicalized
    pub base: RawCustomerRecord,
    pub tenure_per_age: f64,
    pub utilisation_per_age: f64,
    pub credit_lim_per_age: f64,
    pub total_trans_amt_per_credit_lim: f64,
    pub total_trans_ct_per_credit_lim: f64,
}

impl EngineeredRecord {
    /// Look up a numeric column by its (lower-case) name
    pub fn numeric(&self, column: &str) -> Option<f64> {
        let b = &self.base;
        let value = match column {
            "customer_age" => b.customer_age as f64,
            "dependent_count" => b.dependent_count as f64,
            "months_on_book" => b.months_on_book as f64,
            "total_relationship_count" => b.total_relationship_count as f64,
            "months_inactive_12_mon" => b.months_inactive_12_mon as f64,
            "contacts_count_12_mon" => b.contacts_count_12_mon as f64,
            "credit_limit" => b.credit_limit,
            "total_revolving_bal" => b.total_revolving_bal as f64,
            "avg_open_to_buy" => b.avg_open_to_buy,
            "total_amt_chng_q4_q1" => b.total_amt_chng_q4_q1,
            "total_trans_amt" => b.total_trans_amt as f64,
            "total_trans_ct" => b.total_trans_ct as f64,
            "total_ct_chng_q4_q1" => b.total_ct_chng_q4_q1,
            "avg_utilization_ratio" => b.avg_utilization_ratio,
            "tenure_per_age" => self.tenure_per_age,
            "utilisation_per_age" => self.utilisation_per_age,
            "credit_lim_per_age" => self.credit_lim_per_age,
            "total_trans_amt_per_credit_lim" => self.total_trans_amt_per_credit_lim,
            "total_trans_ct_per_credit_lim" => self.total_trans_ct_per_credit_lim,
            _ => return None,
        };
        Some(value)
    }

    /// Look up a categorical column by its (lower-case) name
    pub fn categorical(&self, column: &str) -> Option<&str> {
        let b = &self.base;
        let value = match column {
            "gender" => &b.gender,
            "education_level" => &b.education_level,
            "marital_status" => &b.marital_status,
            "income_category" => &b.income_category,
            "card_category" => &b.card_category,
            _ => return None,
        };
        Some(value.as_str())
    }
}

/// Dense row-major feature matrix produced by the preprocessor.
///
/// One row per input record; every row has the same width.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    width: usize,
    rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Empty matrix with a fixed row width
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            rows: 0,
            data: Vec::new(),
        }
    }

    /// Append one row; returns false (and leaves the matrix untouched) when
    /// the row width differs from the matrix width.
    pub fn push_row(&mut self, row: &[f64]) -> bool {
        if row.len() != self.width {
            return false;
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        true
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.width;
        self.data.get(start..start + self.width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |i| &self.data[i * self.width..(i + 1) * self.width])
    }
}

/// Predicted class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChurnLabel {
    #[serde(rename = "Non-Churn")]
    NonChurn,
    #[serde(rename = "Churn")]
    Churn,
}

impl ChurnLabel {
    /// Map a raw classifier label; only 0 and 1 are meaningful
    pub fn from_class(class: i64) -> Option<Self> {
        match class {
            0 => Some(ChurnLabel::NonChurn),
            1 => Some(ChurnLabel::Churn),
            _ => None,
        }
    }

    pub fn class(&self) -> u8 {
        match self {
            ChurnLabel::NonChurn => 0,
            ChurnLabel::Churn => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnLabel::NonChurn => "Non-Churn",
            ChurnLabel::Churn => "Churn",
        }
    }
}

impl fmt::Display for ChurnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class probabilities, present only for probabilistic classifiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub non_churn: f64,
    pub churn: f64,
}

/// Prediction for one customer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: ChurnLabel,
    pub probabilities: Option<ClassProbabilities>,
}

impl PredictionResult {
    pub fn probability_churn(&self) -> Option<f64> {
        self.probabilities.map(|p| p.churn)
    }

    pub fn probability_non_churn(&self) -> Option<f64> {
        self.probabilities.map(|p| p.non_churn)
    }
}

/// Batch prediction tagged with the position of its input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPrediction {
    pub index: usize,
    #[serde(flatten)]
    pub result: PredictionResult,
}
