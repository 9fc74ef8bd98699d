//! Feature engineering for churn inference
//!
//! Maps a validated customer record to the engineered record the
//! preprocessor was fitted on: categorical sentinels are canonicalized and
//! five ratio features are derived. Pure and deterministic.

use crate::error::ComputationError;
use crate::models::{EngineeredRecord, RawCustomerRecord, RawInput};

/// Placeholder value used in the training data for unknown categories
pub const UNKNOWN_SENTINEL: &str = "Unknown";

/// Replacement for an unknown marital status
pub const MARITAL_STATUS_DEFAULT: &str = "Married";

/// Replacement for an unknown income category
pub const INCOME_CATEGORY_DEFAULT: &str = "Less than $40K";

/// Names of the derived features, in computation order
pub const DERIVED_FEATURES: [&str; 5] = [
    "tenure_per_age",
    "utilisation_per_age",
    "credit_lim_per_age",
    "total_trans_amt_per_credit_lim",
    "total_trans_ct_per_credit_lim",
];

/// Lower-case every field name so lookups are case-insensitive.
///
/// When two keys differ only by case, the one that sorts last wins.
pub fn normalize_field_names(input: &RawInput) -> RawInput {
    input
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect()
}

/// Derives engineered records from validated customer records
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Engineer one record
    pub fn engineer(&self, record: &RawCustomerRecord) -> Result<EngineeredRecord, ComputationError> {
        self.engineer_at(record, None)
    }

    /// Engineer a batch, stopping at the first record that cannot be derived
    pub fn engineer_all(
        &self,
        records: &[RawCustomerRecord],
    ) -> Result<Vec<EngineeredRecord>, ComputationError> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| self.engineer_at(record, Some(i)))
            .collect()
    }

    fn engineer_at(
        &self,
        record: &RawCustomerRecord,
        index: Option<usize>,
    ) -> Result<EngineeredRecord, ComputationError> {
        let mut base = record.clone();
        base.marital_status = canonicalize(&base.marital_status, MARITAL_STATUS_DEFAULT);
        base.income_category = canonicalize(&base.income_category, INCOME_CATEGORY_DEFAULT);

        let age = base.customer_age as f64;
        let credit_limit = base.credit_limit;
        let ratio = |feature, numerator: f64, denominator: f64, denominator_name: &str| {
            derive(index, feature, numerator, denominator, denominator_name)
        };

        let tenure_per_age = ratio(
            DERIVED_FEATURES[0],
            base.months_on_book as f64,
            age * 12.0,
            "customer_age",
        )?;
        let utilisation_per_age = ratio(
            DERIVED_FEATURES[1],
            base.avg_utilization_ratio,
            age,
            "customer_age",
        )?;
        let credit_lim_per_age = ratio(DERIVED_FEATURES[2], credit_limit, age, "customer_age")?;
        let total_trans_amt_per_credit_lim = ratio(
            DERIVED_FEATURES[3],
            base.total_trans_amt as f64,
            credit_limit,
            "credit_limit",
        )?;
        let total_trans_ct_per_credit_lim = ratio(
            DERIVED_FEATURES[4],
            base.total_trans_ct as f64,
            credit_limit,
            "credit_limit",
        )?;

        Ok(EngineeredRecord {
            base,
            tenure_per_age,
            utilisation_per_age,
            credit_lim_per_age,
            total_trans_amt_per_credit_lim,
            total_trans_ct_per_credit_lim,
        })
    }
}

fn canonicalize(value: &str, default: &str) -> String {
    if value == UNKNOWN_SENTINEL {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn derive(
    record: Option<usize>,
    feature: &'static str,
    numerator: f64,
    denominator: f64,
    denominator_name: &str,
) -> Result<f64, ComputationError> {
    if denominator == 0.0 {
        return Err(ComputationError {
            record,
            feature,
            reason: format!("`{}` is zero", denominator_name),
        });
    }
    let value = numerator / denominator;
    if !value.is_finite() {
        return Err(ComputationError {
            record,
            feature,
            reason: format!("{} / {} is not finite", numerator, denominator),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::schema::tests::sample_input;
    use crate::predictor::SchemaValidator;
    use serde_json::json;

    fn sample_record() -> RawCustomerRecord {
        SchemaValidator::new().validate(&sample_input()).unwrap()
    }

    #[test]
    fn test_derived_features_match_formulas() {
        let engineered = FeatureEngineer::new().engineer(&sample_record()).unwrap();

        assert_eq!(engineered.tenure_per_age, 39.0 / (45.0 * 12.0));
        assert_eq!(engineered.utilisation_per_age, 0.061 / 45.0);
        assert_eq!(engineered.credit_lim_per_age, 12691.0 / 45.0);
        assert_eq!(engineered.total_trans_amt_per_credit_lim, 1144.0 / 12691.0);
        assert_eq!(engineered.total_trans_ct_per_credit_lim, 42.0 / 12691.0);

        assert!((engineered.tenure_per_age - 0.0722).abs() < 1e-4);
        assert!((engineered.credit_lim_per_age - 281.8).abs() < 0.5);
        assert!((engineered.total_trans_amt_per_credit_lim - 0.0901).abs() < 1e-4);
    }

    #[test]
    fn test_deterministic_output() {
        let engineer = FeatureEngineer::new();
        let record = sample_record();
        let first = engineer.engineer(&record).unwrap();
        for _ in 0..10 {
            let again = engineer.engineer(&record).unwrap();
            assert_eq!(again, first);
            assert_eq!(again.tenure_per_age.to_bits(), first.tenure_per_age.to_bits());
            assert_eq!(
                again.total_trans_ct_per_credit_lim.to_bits(),
                first.total_trans_ct_per_credit_lim.to_bits()
            );
        }
    }

    #[test]
    fn test_unknown_sentinels_canonicalized() {
        let mut input = sample_input();
        input.insert("marital_status".into(), json!("Unknown"));
        input.insert("income_category".into(), json!("Unknown"));
        input.insert("education_level".into(), json!("Unknown"));
        let record = SchemaValidator::new().validate(&input).unwrap();

        let engineered = FeatureEngineer::new().engineer(&record).unwrap();
        assert_eq!(engineered.base.marital_status, "Married");
        assert_eq!(engineered.base.income_category, "Less than $40K");
        // education keeps its own "Unknown" category
        assert_eq!(engineered.base.education_level, "Unknown");
    }

    #[test]
    fn test_known_categories_untouched() {
        let mut record = sample_record();
        record.marital_status = "Single".into();
        let engineered = FeatureEngineer::new().engineer(&record).unwrap();
        assert_eq!(engineered.base.marital_status, "Single");
        assert_eq!(engineered.base.income_category, "$60K - $80K");
    }

    #[test]
    fn test_zero_age_is_computation_error() {
        let mut record = sample_record();
        record.customer_age = 0;
        let err = FeatureEngineer::new().engineer(&record).unwrap_err();
        assert_eq!(err.feature, "tenure_per_age");
        assert!(err.reason.contains("customer_age"));
    }

    #[test]
    fn test_zero_credit_limit_is_computation_error() {
        let mut record = sample_record();
        record.credit_limit = 0.0;
        let err = FeatureEngineer::new().engineer(&record).unwrap_err();
        assert_eq!(err.feature, "total_trans_amt_per_credit_lim");
        assert!(err.reason.contains("credit_limit"));
    }

    #[test]
    fn test_batch_error_reports_record_index() {
        let mut bad = sample_record();
        bad.credit_limit = 0.0;
        let records = vec![sample_record(), sample_record(), bad];
        let err = FeatureEngineer::new().engineer_all(&records).unwrap_err();
        assert_eq!(err.record, Some(2));
    }

    #[test]
    fn test_engineered_columns_addressable_by_name() {
        let engineered = FeatureEngineer::new().engineer(&sample_record()).unwrap();
        assert_eq!(engineered.numeric("customer_age"), Some(45.0));
        assert_eq!(
            engineered.numeric("credit_lim_per_age"),
            Some(engineered.credit_lim_per_age)
        );
        assert_eq!(engineered.categorical("card_category"), Some("Blue"));
        assert_eq!(engineered.numeric("gender"), None);
        assert_eq!(engineered.categorical("customer_age"), None);
    }

    #[test]
    fn test_normalize_field_names() {
        let mut input = RawInput::new();
        input.insert("Customer_Age".into(), json!(45));
        input.insert("GENDER".into(), json!("F"));
        let normalized = normalize_field_names(&input);
        assert_eq!(normalized.get("customer_age"), Some(&json!(45)));
        assert_eq!(normalized.get("gender"), Some(&json!("F")));
    }
}
