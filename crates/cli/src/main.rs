//! Churn prediction CLI
//!
//! A command-line tool for checking the churn prediction service and
//! scoring customer records from JSON or CSV files.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{predict, service};
use std::path::PathBuf;

/// Churn prediction CLI
#[derive(Parser)]
#[command(name = "churn")]
#[command(author, version, about = "CLI for the churn prediction service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CHURN_API_URL env var)
    #[arg(long, env = "CHURN_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service health and artifact status
    Health,

    /// Check whether predictions can be served
    Ready,

    /// Show model metadata
    ModelInfo,

    /// List the transformed feature names
    Features,

    /// Score customer records from a JSON file
    Predict {
        /// JSON file holding one customer object or an array of them
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Score a CSV file and return it with prediction columns appended
    PredictCsv {
        /// CSV file with one customer per row
        input: PathBuf,

        /// Where to write the scored CSV (stdout if not specified)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Health => service::show_health(&client, cli.format).await?,
        Commands::Ready => service::show_readiness(&client, cli.format).await?,
        Commands::ModelInfo => service::show_model_info(&client, cli.format).await?,
        Commands::Features => service::show_features(&client, cli.format).await?,
        Commands::Predict { input } => predict::predict(&client, &input, cli.format).await?,
        Commands::PredictCsv { input, output } => {
            predict::predict_csv(&client, &input, output.as_deref()).await?
        }
    }

    Ok(())
}
