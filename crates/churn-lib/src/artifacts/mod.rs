//! Frozen model artifacts
//!
//! The [`ArtifactBundle`] is built once at startup by an [`ArtifactLoader`]
//! and then shared read-only by every request. Each slot (classifier,
//! preprocessor, feature list, metadata) loads independently; a slot that
//! fails is left empty and the failure reason recorded.

mod classifier;
mod loader;
mod onnx;
mod preprocessor;

pub use classifier::{Classifier, LabelsAndProbabilities, LogisticClassifier};
pub use loader::{ArtifactPaths, FsArtifactLoader, Manifest};
pub use onnx::OnnxClassifier;
pub use preprocessor::{ColumnTransformer, FittedTransformer, Preprocessor};

use crate::models::ModelMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Produces the artifact bundle at process start
pub trait ArtifactLoader {
    /// Load every slot; never fails as a whole, failures are recorded per slot
    fn load(&self) -> ArtifactBundle;
}

/// Independently loadable parts of the bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    Classifier,
    Preprocessor,
    FeatureNames,
    Metadata,
}

impl ArtifactSlot {
    pub const ALL: [ArtifactSlot; 4] = [
        ArtifactSlot::Classifier,
        ArtifactSlot::Preprocessor,
        ArtifactSlot::FeatureNames,
        ArtifactSlot::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactSlot::Classifier => "classifier",
            ArtifactSlot::Preprocessor => "preprocessor",
            ArtifactSlot::FeatureNames => "feature_names",
            ArtifactSlot::Metadata => "metadata",
        }
    }

    /// Whether inference is impossible without this slot
    pub fn is_required(&self) -> bool {
        matches!(self, ArtifactSlot::Classifier | ArtifactSlot::Preprocessor)
    }
}

impl fmt::Display for ArtifactSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable container for the trained classifier and its companions
pub struct ArtifactBundle {
    classifier: Option<Box<dyn Classifier>>,
    preprocessor: Option<Box<dyn Preprocessor>>,
    feature_names: Option<Vec<String>>,
    metadata: Option<ModelMetadata>,
    failures: BTreeMap<ArtifactSlot, String>,
    loaded_at: DateTime<Utc>,
}

impl ArtifactBundle {
    pub fn builder() -> ArtifactBundleBuilder {
        ArtifactBundleBuilder::default()
    }

    pub fn classifier(&self) -> Option<&dyn Classifier> {
        self.classifier.as_deref()
    }

    pub fn preprocessor(&self) -> Option<&dyn Preprocessor> {
        self.preprocessor.as_deref()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_loaded(&self, slot: ArtifactSlot) -> bool {
        match slot {
            ArtifactSlot::Classifier => self.classifier.is_some(),
            ArtifactSlot::Preprocessor => self.preprocessor.is_some(),
            ArtifactSlot::FeatureNames => self.feature_names.is_some(),
            ArtifactSlot::Metadata => self.metadata.is_some(),
        }
    }

    /// Recorded load failure for a slot, if any
    pub fn failure(&self, slot: ArtifactSlot) -> Option<&str> {
        self.failures.get(&slot).map(String::as_str)
    }

    /// True when the classifier or the preprocessor is missing
    pub fn is_degraded(&self) -> bool {
        ArtifactSlot::ALL
            .iter()
            .any(|slot| slot.is_required() && !self.is_loaded(*slot))
    }

    /// Required slots that are not loaded
    pub fn missing_required(&self) -> Vec<ArtifactSlot> {
        ArtifactSlot::ALL
            .into_iter()
            .filter(|slot| slot.is_required() && !self.is_loaded(*slot))
            .collect()
    }

    /// Model name from the bundled metadata, when present
    pub fn model_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("model_name"))
            .and_then(|v| v.as_str())
    }
}

impl fmt::Debug for ArtifactBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactBundle")
            .field("classifier", &self.classifier.as_ref().map(|c| c.name().to_string()))
            .field("preprocessor", &self.preprocessor.is_some())
            .field("feature_names", &self.feature_names.as_ref().map(Vec::len))
            .field("metadata", &self.metadata.is_some())
            .field("failures", &self.failures)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Assembles a bundle slot by slot
#[derive(Default)]
pub struct ArtifactBundleBuilder {
    classifier: Option<Box<dyn Classifier>>,
    preprocessor: Option<Box<dyn Preprocessor>>,
    feature_names: Option<Vec<String>>,
    metadata: Option<ModelMetadata>,
    failures: BTreeMap<ArtifactSlot, String>,
}

impl ArtifactBundleBuilder {
    pub fn classifier(self, classifier: impl Classifier + 'static) -> Self {
        self.boxed_classifier(Box::new(classifier))
    }

    pub fn boxed_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self.failures.remove(&ArtifactSlot::Classifier);
        self
    }

    pub fn preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessor = Some(Box::new(preprocessor));
        self.failures.remove(&ArtifactSlot::Preprocessor);
        self
    }

    pub fn feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self.failures.remove(&ArtifactSlot::FeatureNames);
        self
    }

    pub fn metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self.failures.remove(&ArtifactSlot::Metadata);
        self
    }

    /// Mark a slot as failed; clears anything previously set in it
    pub fn failed(mut self, slot: ArtifactSlot, reason: impl Into<String>) -> Self {
        match slot {
            ArtifactSlot::Classifier => self.classifier = None,
            ArtifactSlot::Preprocessor => self.preprocessor = None,
            ArtifactSlot::FeatureNames => self.feature_names = None,
            ArtifactSlot::Metadata => self.metadata = None,
        }
        self.failures.insert(slot, reason.into());
        self
    }

    /// Input width the classifier must accept: what the preprocessor emits,
    /// or the feature list length when no preprocessor width is known
    pub fn expected_width(&self) -> Option<usize> {
        self.preprocessor
            .as_ref()
            .and_then(|p| p.output_width())
            .or_else(|| self.feature_names.as_ref().map(Vec::len))
    }

    pub fn build(self) -> ArtifactBundle {
        ArtifactBundle {
            classifier: self.classifier,
            preprocessor: self.preprocessor,
            feature_names: self.feature_names,
            metadata: self.metadata,
            failures: self.failures,
            loaded_at: Utc::now(),
        }
    }
}
