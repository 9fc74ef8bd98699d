//! Churn Server - HTTP serving for the churn classifier
//!
//! Loads the model artifacts once at startup and serves single, batch and
//! CSV predictions until interrupted.

use anyhow::{Context, Result};
use churn_lib::{
    artifacts::{ArtifactLoader, FsArtifactLoader},
    observability::StructuredLogger,
    ChurnPredictor,
};
use churn_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(fmt::layer().json())
        .init();

    info!(
        artifacts_dir = %config.artifacts_dir.display(),
        strict_feature_width = config.strict_feature_width,
        "Starting churn-server"
    );

    // One-time blocking artifact load; the bundle is read-only afterwards
    let loader = FsArtifactLoader::new(config.artifact_paths());
    let bundle = tokio::task::spawn_blocking(move || loader.load())
        .await
        .context("Artifact loading task failed")?;

    let predictor = ChurnPredictor::new(Arc::new(bundle), config.pipeline());

    let logger = StructuredLogger::new("churn-server");
    logger.log_startup(
        SERVER_VERSION,
        predictor.bundle().model_name(),
        predictor.bundle().is_degraded(),
    );

    let state = Arc::new(api::AppState::new(Arc::new(predictor), config.max_upload_bytes));
    let server = tokio::spawn(api::serve(config.bind_addr(), state));

    tokio::select! {
        result = server => {
            result.context("API server task failed")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
