//! Service status commands: health, readiness, model info and features

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use tabled::Tabled;

use crate::client::{ApiClient, FeatureList, HealthReport, Readiness};
use crate::output::{color_status, format_timestamp, print_info, print_success, print_warning, OutputFormat};

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Artifact")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for the feature list table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Feature")]
    name: String,
}

/// Show the service health report
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: HealthReport = client.get("health").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:     {}", color_status(&report.status));
            if let Some(model) = &report.model_name {
                println!("Model:      {}", model);
            }
            if let Some(loaded_at) = &report.loaded_at {
                println!("Loaded at:  {}", format_timestamp(loaded_at));
            }
            println!();

            let rows: Vec<ComponentRow> = report
                .components
                .iter()
                .map(|(name, health)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&health.status),
                    message: health.message.clone().unwrap_or_default(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show whether the service can serve predictions
pub async fn show_readiness(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, readiness): (_, Readiness) = client.get_status("readyz").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&readiness)?);
        }
        OutputFormat::Table => {
            if readiness.ready {
                print_success("Service is ready");
            } else {
                print_warning("Service is not ready");
            }
            let flag = |loaded: bool| if loaded { "yes".green() } else { "no".red() };
            println!("  classifier:    {}", flag(readiness.classifier_loaded));
            println!("  preprocessor:  {}", flag(readiness.preprocessor_loaded));
            println!("  feature list:  {}", flag(readiness.feature_list_loaded));
            println!("  metadata:      {}", flag(readiness.metadata_loaded));
            if let Some(reason) = &readiness.reason {
                println!();
                print_info(reason);
            }
        }
    }

    Ok(())
}

/// Show the model metadata bundled with the artifacts
pub async fn show_model_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info: Value = client.get("model-info").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Table => {
            println!("{}", "Model Info".bold());
            println!("{}", "=".repeat(50));
            if let Value::Object(fields) = &info {
                for (key, value) in fields {
                    match value {
                        Value::Object(nested) => {
                            println!("{}:", key);
                            for (k, v) in nested {
                                println!("  {:<22} {}", k, scalar(v));
                            }
                        }
                        other => println!("{:<24} {}", key, scalar(other)),
                    }
                }
            } else {
                println!("{}", info);
            }
        }
    }

    Ok(())
}

/// List the transformed feature names
pub async fn show_features(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let features: FeatureList = client.get("features").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&features)?);
        }
        OutputFormat::Table => {
            let rows: Vec<FeatureRow> = features
                .feature_names
                .iter()
                .enumerate()
                .map(|(position, name)| FeatureRow {
                    position,
                    name: name.clone(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} features", features.total_features);
        }
    }

    Ok(())
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
