//! Server configuration

use anyhow::{Context, Result};
use churn_lib::{ArtifactPaths, PipelineConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Config file read when `CHURN_CONFIG` is not set; optional
const DEFAULT_CONFIG_FILE: &str = "config/churn-server";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port for the prediction API, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the model artifacts
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Reject requests whose transformed width differs from the feature list
    #[serde(default)]
    pub strict_feature_width: bool,

    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            artifacts_dir: default_artifacts_dir(),
            strict_feature_width: false,
            log_level: default_log_level(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    /// Load from the config file (if any) and `CHURN_*` environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var("CHURN_CONFIG").ok().map(PathBuf::from);
        Self::from_sources(file, None)
    }

    /// Build from an explicit config file and, when given, an explicit
    /// environment map instead of the process environment
    pub fn from_sources(
        file: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let file_source = match &file {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("CHURN")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to read configuration sources")?;

        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.artifacts_dir)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            strict_feature_width: self.strict_feature_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = ServerConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert!(!config.pipeline().strict_feature_width);
    }

    #[test]
    fn test_environment_overrides() {
        let config = ServerConfig::from_sources(
            None,
            env(&[
                ("CHURN_PORT", "9100"),
                ("CHURN_ARTIFACTS_DIR", "/srv/models"),
                ("CHURN_STRICT_FEATURE_WIDTH", "true"),
                ("CHURN_MAX_UPLOAD_BYTES", "1024"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.artifacts_dir, PathBuf::from("/srv/models"));
        assert!(config.pipeline().strict_feature_width);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.artifact_paths().path("classifier.json"), PathBuf::from("/srv/models/classifier.json"));
    }

    #[test]
    fn test_file_then_environment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("churn.toml");
        fs::write(&path, "port = 7000\nlog_level = \"debug\"\n").unwrap();

        let config =
            ServerConfig::from_sources(Some(path.clone()), env(&[("CHURN_PORT", "7001")])).unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.log_level, "debug");

        let config = ServerConfig::from_sources(Some(path), env(&[])).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ServerConfig::from_sources(Some(PathBuf::from("/nonexistent/churn.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_value_is_error() {
        let result = ServerConfig::from_sources(None, env(&[("CHURN_PORT", "not-a-port")]));
        assert!(result.is_err());
    }
}
