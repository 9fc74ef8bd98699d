//! Schema validation for raw customer records
//!
//! Checks presence, type and declared range/membership of every field before
//! anything is transformed. Unknown extra fields are ignored.

use super::features::normalize_field_names;
use crate::error::{Constraint, FieldViolation, ValidationError};
use crate::models::{RawCustomerRecord, RawInput};
use serde_json::Value;

pub const GENDERS: &[&str] = &["M", "F"];

pub const EDUCATION_LEVELS: &[&str] = &[
    "Uneducated",
    "High School",
    "College",
    "Graduate",
    "Post-Graduate",
    "Doctorate",
    "Unknown",
];

pub const MARITAL_STATUSES: &[&str] = &["Married", "Single", "Divorced", "Unknown"];

pub const INCOME_CATEGORIES: &[&str] = &[
    "Less than $40K",
    "$40K - $60K",
    "$60K - $80K",
    "$80K - $120K",
    "$120K +",
    "Unknown",
];

pub const CARD_CATEGORIES: &[&str] = &["Blue", "Silver", "Gold", "Platinum"];

/// Names of every field the schema requires, in declaration order
pub const FIELD_NAMES: &[&str] = &[
    "customer_age",
    "gender",
    "dependent_count",
    "education_level",
    "marital_status",
    "income_category",
    "card_category",
    "months_on_book",
    "total_relationship_count",
    "months_inactive_12_mon",
    "contacts_count_12_mon",
    "credit_limit",
    "total_revolving_bal",
    "avg_open_to_buy",
    "total_amt_chng_q4_q1",
    "total_trans_amt",
    "total_trans_ct",
    "total_ct_chng_q4_q1",
    "avg_utilization_ratio",
];

/// Validates raw inputs into typed customer records
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single record
    pub fn validate(&self, input: &RawInput) -> Result<RawCustomerRecord, ValidationError> {
        let mut violations = Vec::new();
        let record = read_record(input, None, &mut violations);
        if violations.is_empty() {
            Ok(record)
        } else {
            Err(ValidationError { violations })
        }
    }

    /// Validate a list of records; violations from every record are reported
    /// together, tagged with the record position.
    pub fn validate_all(
        &self,
        inputs: &[RawInput],
    ) -> Result<Vec<RawCustomerRecord>, ValidationError> {
        let mut violations = Vec::new();
        let records: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| read_record(input, Some(i), &mut violations))
            .collect();

        if violations.is_empty() {
            Ok(records)
        } else {
            Err(ValidationError { violations })
        }
    }
}

fn read_record(
    input: &RawInput,
    record: Option<usize>,
    violations: &mut Vec<FieldViolation>,
) -> RawCustomerRecord {
    let normalized = normalize_field_names(input);
    let mut r = FieldReader {
        input: &normalized,
        record,
        violations,
    };

    RawCustomerRecord {
        customer_age: r.integer("customer_age", 18, Some(100)),
        gender: r.category("gender", GENDERS),
        dependent_count: r.integer("dependent_count", 0, Some(10)),
        education_level: r.category("education_level", EDUCATION_LEVELS),
        marital_status: r.category("marital_status", MARITAL_STATUSES),
        income_category: r.category("income_category", INCOME_CATEGORIES),
        card_category: r.category("card_category", CARD_CATEGORIES),
        months_on_book: r.integer("months_on_book", 0, None),
        total_relationship_count: r.integer("total_relationship_count", 1, Some(6)),
        months_inactive_12_mon: r.integer("months_inactive_12_mon", 0, Some(12)),
        contacts_count_12_mon: r.integer("contacts_count_12_mon", 0, None),
        credit_limit: r.float("credit_limit", Some(0.0), None),
        total_revolving_bal: r.integer("total_revolving_bal", 0, None),
        avg_open_to_buy: r.float("avg_open_to_buy", Some(0.0), None),
        total_amt_chng_q4_q1: r.float("total_amt_chng_q4_q1", None, None),
        total_trans_amt: r.integer("total_trans_amt", 0, None),
        total_trans_ct: r.integer("total_trans_ct", 0, None),
        total_ct_chng_q4_q1: r.float("total_ct_chng_q4_q1", None, None),
        avg_utilization_ratio: r.float("avg_utilization_ratio", Some(0.0), Some(1.0)),
    }
}

/// Reads typed fields, recording a violation (and yielding a placeholder)
/// for every field that fails its constraint.
struct FieldReader<'a> {
    input: &'a RawInput,
    record: Option<usize>,
    violations: &'a mut Vec<FieldViolation>,
}

impl<'a> FieldReader<'a> {
    fn reject(&mut self, field: &'static str, constraint: Constraint) {
        self.violations.push(FieldViolation {
            record: self.record,
            field,
            constraint,
        });
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.input.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    fn number(&mut self, field: &'static str, expected: &'static str) -> Option<f64> {
        let Some(value) = self.present(field) else {
            self.reject(field, Constraint::Missing);
            return None;
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Some(v),
            _ => {
                let found = describe(value);
                self.reject(field, Constraint::WrongType { expected, found });
                None
            }
        }
    }

    fn in_range(
        &mut self,
        field: &'static str,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    ) -> bool {
        let ok = min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max);
        if !ok {
            self.reject(field, Constraint::OutOfRange { value, min, max });
        }
        ok
    }

    fn integer(&mut self, field: &'static str, min: u32, max: Option<u32>) -> u32 {
        let Some(value) = self.number(field, "integer") else {
            return 0;
        };
        if value.fract() != 0.0 {
            let found = value.to_string();
            self.reject(
                field,
                Constraint::WrongType {
                    expected: "integer",
                    found,
                },
            );
            return 0;
        }
        // unbounded fields are still capped by the storage type
        let upper = match max {
            Some(max) => Some(max as f64),
            None if value > u32::MAX as f64 => Some(u32::MAX as f64),
            None => None,
        };
        if self.in_range(field, value, Some(min as f64), upper) {
            value as u32
        } else {
            0
        }
    }

    fn float(&mut self, field: &'static str, min: Option<f64>, max: Option<f64>) -> f64 {
        let Some(value) = self.number(field, "number") else {
            return 0.0;
        };
        if self.in_range(field, value, min, max) {
            value
        } else {
            0.0
        }
    }

    fn category(&mut self, field: &'static str, allowed: &'static [&'static str]) -> String {
        let Some(value) = self.present(field) else {
            self.reject(field, Constraint::Missing);
            return String::new();
        };
        let Value::String(s) = value else {
            let found = describe(value);
            self.reject(
                field,
                Constraint::WrongType {
                    expected: "string",
                    found,
                },
            );
            return String::new();
        };
        let s = s.trim();
        if allowed.contains(&s) {
            s.to_string()
        } else {
            self.reject(
                field,
                Constraint::NotAllowed {
                    value: s.to_string(),
                    allowed: allowed.to_vec(),
                },
            );
            String::new()
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_input() -> RawInput {
        json!({
            "customer_age": 45,
            "gender": "M",
            "dependent_count": 3,
            "education_level": "Graduate",
            "marital_status": "Married",
            "income_category": "$60K - $80K",
            "card_category": "Blue",
            "months_on_book": 39,
            "total_relationship_count": 5,
            "months_inactive_12_mon": 1,
            "contacts_count_12_mon": 3,
            "credit_limit": 12691.0,
            "total_revolving_bal": 777,
            "avg_open_to_buy": 11914.0,
            "total_amt_chng_q4_q1": 1.335,
            "total_trans_amt": 1144,
            "total_trans_ct": 42,
            "total_ct_chng_q4_q1": 1.625,
            "avg_utilization_ratio": 0.061
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn violations_of(input: &RawInput) -> Vec<FieldViolation> {
        SchemaValidator::new().validate(input).unwrap_err().violations
    }

    #[test]
    fn test_valid_record_accepted() {
        let record = SchemaValidator::new().validate(&sample_input()).unwrap();
        assert_eq!(record.customer_age, 45);
        assert_eq!(record.income_category, "$60K - $80K");
        assert_eq!(record.credit_limit, 12691.0);
        assert_eq!(record.avg_utilization_ratio, 0.061);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let mut input = sample_input();
        input.insert("clientnum".into(), json!(768805383));
        input.insert("attrition_flag".into(), json!("Existing Customer"));
        assert!(SchemaValidator::new().validate(&input).is_ok());
    }

    #[test]
    fn test_field_names_case_insensitive() {
        let mut input = RawInput::new();
        for (key, value) in sample_input() {
            input.insert(key.to_uppercase(), value);
        }
        assert!(SchemaValidator::new().validate(&input).is_ok());
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut input = sample_input();
        input.remove("credit_limit");
        let violations = violations_of(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "credit_limit");
        assert_eq!(violations[0].constraint, Constraint::Missing);
    }

    #[test]
    fn test_null_and_blank_count_as_missing() {
        let mut input = sample_input();
        input.insert("gender".into(), Value::Null);
        input.insert("months_on_book".into(), json!("  "));
        let violations = violations_of(&input);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.constraint == Constraint::Missing));
    }

    #[test]
    fn test_out_of_range_rejected_not_clamped() {
        let mut input = sample_input();
        input.insert("customer_age".into(), json!(150));
        input.insert("avg_utilization_ratio".into(), json!(1.2));
        let violations = violations_of(&input);
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations[0].constraint,
            Constraint::OutOfRange {
                value: 150.0,
                min: Some(18.0),
                max: Some(100.0)
            }
        );
        assert_eq!(violations[1].field, "avg_utilization_ratio");
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut input = sample_input();
        input.insert("total_trans_amt".into(), json!(-5));
        let violations = violations_of(&input);
        assert_eq!(violations[0].field, "total_trans_amt");
        assert!(matches!(
            violations[0].constraint,
            Constraint::OutOfRange { min: Some(min), max: None, .. } if min == 0.0
        ));
    }

    #[test]
    fn test_unbounded_ratio_accepts_negative() {
        let mut input = sample_input();
        input.insert("total_amt_chng_q4_q1".into(), json!(-0.25));
        assert!(SchemaValidator::new().validate(&input).is_ok());
    }

    #[test]
    fn test_type_errors() {
        let mut input = sample_input();
        input.insert("customer_age".into(), json!(45.5));
        input.insert("credit_limit".into(), json!("lots"));
        input.insert("gender".into(), json!(1));
        let violations = violations_of(&input);
        assert_eq!(violations.len(), 3);
        assert!(violations
            .iter()
            .all(|v| matches!(v.constraint, Constraint::WrongType { .. })));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let mut input = sample_input();
        input.insert("customer_age".into(), json!("45"));
        input.insert("credit_limit".into(), json!("12691.0"));
        let record = SchemaValidator::new().validate(&input).unwrap();
        assert_eq!(record.customer_age, 45);
        assert_eq!(record.credit_limit, 12691.0);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut input = sample_input();
        input.insert("card_category".into(), json!("Black"));
        let violations = violations_of(&input);
        assert!(matches!(
            &violations[0].constraint,
            Constraint::NotAllowed { value, .. } if value == "Black"
        ));
    }

    #[test]
    fn test_unknown_sentinel_is_valid_input() {
        let mut input = sample_input();
        input.insert("marital_status".into(), json!("Unknown"));
        input.insert("income_category".into(), json!("Unknown"));
        let record = SchemaValidator::new().validate(&input).unwrap();
        // canonicalization happens later, in feature engineering
        assert_eq!(record.marital_status, "Unknown");
    }

    #[test]
    fn test_batch_violations_tagged_with_record_index() {
        let mut bad = sample_input();
        bad.insert("customer_age".into(), json!(12));
        let inputs = vec![sample_input(), bad, sample_input()];

        let err = SchemaValidator::new().validate_all(&inputs).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].record, Some(1));
    }
}
