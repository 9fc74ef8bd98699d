//! Prediction commands

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, BatchItem, BatchPrediction, ServiceError, SinglePrediction};
use crate::output::{
    color_churn_probability, color_label, format_timestamp, print_error, print_info,
    print_success, OutputFormat,
};

/// Row for the prediction table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Index")]
    index: usize,
    #[tabled(rename = "Prediction")]
    label: String,
    #[tabled(rename = "P(churn)")]
    churn: String,
}

impl From<&BatchItem> for PredictionRow {
    fn from(item: &BatchItem) -> Self {
        Self {
            index: item.index,
            label: color_label(&item.prediction_label),
            churn: item
                .probabilities
                .map(|p| color_churn_probability(p.churn))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Request a JSON input file maps to
#[derive(Debug, PartialEq)]
enum PredictRequest {
    Single(Value),
    Batch(Value),
}

fn classify_input(input: Value) -> Result<PredictRequest> {
    match input {
        Value::Object(_) => Ok(PredictRequest::Single(input)),
        Value::Array(_) => Ok(PredictRequest::Batch(input)),
        _ => bail!("input must be a JSON object (one customer) or an array of objects"),
    }
}

/// Score the customer record(s) in a JSON file
pub async fn predict(client: &ApiClient, input: &Path, format: OutputFormat) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;

    let result = match classify_input(value)? {
        PredictRequest::Single(body) => client
            .post::<SinglePrediction, _>("predict", &body)
            .await
            .map(|p| print_single(&p, format)),
        PredictRequest::Batch(body) => client
            .post::<BatchPrediction, _>("predict-batch", &body)
            .await
            .map(|b| print_batch(&b, format)),
    };

    match result {
        Ok(printed) => printed,
        Err(err) => {
            if let Some(service) = err.downcast_ref::<ServiceError>() {
                report_service_error(service);
            }
            Err(err)
        }
    }
}

fn print_single(prediction: &SinglePrediction, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(prediction)?);
        }
        OutputFormat::Table => {
            println!("Prediction:  {}", color_label(&prediction.prediction_label));
            if let Some(p) = prediction.probabilities {
                println!("P(churn):    {}", color_churn_probability(p.churn));
            }
            println!("Scored at:   {}", format_timestamp(&prediction.timestamp));
        }
    }
    Ok(())
}

fn print_batch(batch: &BatchPrediction, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(batch)?);
        }
        OutputFormat::Table => {
            if batch.predictions.is_empty() {
                print_info("No records to score");
                return Ok(());
            }
            let rows: Vec<PredictionRow> = batch.predictions.iter().map(PredictionRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let churned = batch.predictions.iter().filter(|p| p.prediction == 1).count();
            println!("\nTotal: {} records, {} predicted to churn", batch.count, churned);
        }
    }
    Ok(())
}

fn report_service_error(err: &ServiceError) {
    match &err.stage {
        Some(stage) => print_error(&format!("{} failed at {}: {}", err.kind, stage, err.message)),
        None => print_error(&format!("{}: {}", err.kind, err.message)),
    }
    if let Some(Value::Array(details)) = &err.details {
        for detail in details {
            println!("  {}", detail);
        }
    }
}

/// Score a CSV file and write the annotated table
pub async fn predict_csv(client: &ApiClient, input: &Path, output: Option<&Path>) -> Result<()> {
    let csv = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let scored = client.post_csv("predict-csv", csv).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &scored)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let rows = scored.lines().count().saturating_sub(1);
            print_success(&format!("{} scored rows written to {}", rows, path.display()));
        }
        None => print!("{}", scored),
    }

    Ok(())
}
