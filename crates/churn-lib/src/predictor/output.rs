//! Result formatting for the three request shapes

use super::inference::Scored;
use crate::error::TableError;
use crate::models::{IndexedPrediction, PredictionResult};
use crate::table::Table;

/// Appended label column (0 = Non-Churn, 1 = Churn)
pub const LABEL_COLUMN: &str = "churn_prediction";
pub const PROBA_NON_CHURN_COLUMN: &str = "proba_non_churn";
pub const PROBA_CHURN_COLUMN: &str = "proba_churn";

/// Shapes scored results for the caller
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Tag each result with the position of its input record
    pub fn indexed(&self, scored: Scored) -> Vec<IndexedPrediction> {
        scored
            .results
            .into_iter()
            .enumerate()
            .map(|(index, result)| IndexedPrediction { index, result })
            .collect()
    }

    /// Copy of `table` with the prediction columns appended; prediction
    /// columns from an earlier scoring are replaced
    pub fn append_to_table(&self, table: &Table, scored: &Scored) -> Result<Table, TableError> {
        let mut out = table.clone();
        for column in [LABEL_COLUMN, PROBA_NON_CHURN_COLUMN, PROBA_CHURN_COLUMN] {
            out.drop_column(column);
        }
        out.append_column(
            LABEL_COLUMN,
            scored
                .results
                .iter()
                .map(|r| r.label.class().to_string())
                .collect(),
        )?;

        if scored.probabilistic {
            out.append_column(
                PROBA_NON_CHURN_COLUMN,
                probability_column(&scored.results, PredictionResult::probability_non_churn),
            )?;
            out.append_column(
                PROBA_CHURN_COLUMN,
                probability_column(&scored.results, PredictionResult::probability_churn),
            )?;
        }
        Ok(out)
    }
}

fn probability_column(
    results: &[PredictionResult],
    pick: fn(&PredictionResult) -> Option<f64>,
) -> Vec<String> {
    results
        .iter()
        .map(|r| pick(r).map(|p| p.to_string()).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChurnLabel, ClassProbabilities};

    fn scored(probabilistic: bool) -> Scored {
        let result = |label, churn: f64| PredictionResult {
            label,
            probabilities: probabilistic.then(|| ClassProbabilities {
                non_churn: 1.0 - churn,
                churn,
            }),
        };
        Scored {
            results: vec![
                result(ChurnLabel::NonChurn, 0.25),
                result(ChurnLabel::Churn, 0.75),
            ],
            probabilistic,
        }
    }

    #[test]
    fn test_indexed_preserves_order() {
        let indexed = OutputFormatter::new().indexed(scored(true));
        assert_eq!(indexed[0].index, 0);
        assert_eq!(indexed[1].index, 1);
        assert_eq!(indexed[1].result.label, ChurnLabel::Churn);
    }

    #[test]
    fn test_appends_three_columns_with_probabilities() {
        let table = Table::from_csv_str("id\na\nb\n").unwrap();
        let out = OutputFormatter::new().append_to_table(&table, &scored(true)).unwrap();
        assert_eq!(out.columns(), &["id", LABEL_COLUMN, PROBA_NON_CHURN_COLUMN, PROBA_CHURN_COLUMN]);
        assert_eq!(out.row(1).unwrap(), &["b", "1", "0.25", "0.75"]);
        // input table untouched
        assert_eq!(table.columns().len(), 1);
    }

    #[test]
    fn test_appends_label_only_without_probabilities() {
        let table = Table::from_csv_str("id\na\nb\n").unwrap();
        let out = OutputFormatter::new().append_to_table(&table, &scored(false)).unwrap();
        assert_eq!(out.columns(), &["id", LABEL_COLUMN]);
        assert_eq!(out.row(0).unwrap(), &["a", "0"]);
    }

    #[test]
    fn test_previous_prediction_columns_are_replaced() {
        let table = Table::from_csv_str(
            "id,churn_prediction,proba_non_churn,proba_churn,note\na,1,0.1,0.9,x\nb,0,0.8,0.2,y\n",
        )
        .unwrap();
        let out = OutputFormatter::new().append_to_table(&table, &scored(true)).unwrap();
        assert_eq!(
            out.columns(),
            &["id", "note", LABEL_COLUMN, PROBA_NON_CHURN_COLUMN, PROBA_CHURN_COLUMN]
        );
        assert_eq!(out.row(0).unwrap(), &["a", "x", "0", "0.75", "0.25"]);

        // stale probabilities do not survive a label-only scoring
        let out = OutputFormatter::new().append_to_table(&table, &scored(false)).unwrap();
        assert_eq!(out.columns(), &["id", "note", LABEL_COLUMN]);
    }

    #[test]
    fn test_indexed_serializes_flat() {
        let indexed = OutputFormatter::new().indexed(scored(true));
        let json = serde_json::to_value(&indexed[1]).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["label"], "Churn");
        assert_eq!(json["probabilities"]["churn"], 0.75);
    }
}
