//! Churn classifier serving core
//!
//! This crate provides:
//! - Artifact loading (classifier, fitted preprocessor, feature list, metadata)
//! - Schema validation and feature engineering of raw customer records
//! - The prediction pipeline for single, batch and tabular requests
//! - Health checks and observability

pub mod artifacts;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod table;

pub use artifacts::{ArtifactBundle, ArtifactLoader, ArtifactPaths, ArtifactSlot, FsArtifactLoader};
pub use error::{PredictionError, PredictionFailure, Stage};
pub use health::{ComponentHealth, ComponentStatus, HealthReport, Readiness};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use predictor::{ChurnPredictor, PipelineConfig};
pub use table::Table;
