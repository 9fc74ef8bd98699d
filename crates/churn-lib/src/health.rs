//! Health and readiness reporting
//!
//! The artifact bundle never changes after startup, so health is a pure
//! function of the bundle rather than a registry updated at runtime.

use crate::artifacts::{ArtifactBundle, ArtifactSlot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is missing but the service can still serve predictions
    Degraded,
    /// Component is missing and predictions are refused
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message.into()),
        }
    }

    fn for_slot(bundle: &ArtifactBundle, slot: ArtifactSlot) -> Self {
        if bundle.is_loaded(slot) {
            return Self::healthy();
        }
        let message = bundle.failure(slot).unwrap_or("not loaded").to_string();
        if slot.is_required() {
            Self::unhealthy(message)
        } else {
            Self::degraded(message)
        }
    }
}

/// Overall health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy`, or `degraded` when the classifier or preprocessor is missing
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_bundle(bundle: &ArtifactBundle) -> Self {
        let components = ArtifactSlot::ALL
            .into_iter()
            .map(|slot| (slot.as_str().to_string(), ComponentHealth::for_slot(bundle, slot)))
            .collect();
        let status = if bundle.is_degraded() {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        };
        Self {
            status,
            components,
            model_name: bundle.model_name().map(str::to_string),
            loaded_at: bundle.loaded_at(),
        }
    }
}

/// Readiness of the prediction pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub classifier_loaded: bool,
    pub preprocessor_loaded: bool,
    pub feature_list_loaded: bool,
    pub metadata_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Readiness {
    pub fn from_bundle(bundle: &ArtifactBundle) -> Self {
        let missing = bundle.missing_required();
        let reason = if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            Some(format!("required artifacts not loaded: {}", names.join(", ")))
        } else if !bundle.is_loaded(ArtifactSlot::FeatureNames) {
            Some("feature list not loaded, feature width is not checked".to_string())
        } else {
            None
        };

        Self {
            ready: missing.is_empty(),
            classifier_loaded: bundle.is_loaded(ArtifactSlot::Classifier),
            preprocessor_loaded: bundle.is_loaded(ArtifactSlot::Preprocessor),
            feature_list_loaded: bundle.is_loaded(ArtifactSlot::FeatureNames),
            metadata_loaded: bundle.is_loaded(ArtifactSlot::Metadata),
            reason,
        }
    }
}
