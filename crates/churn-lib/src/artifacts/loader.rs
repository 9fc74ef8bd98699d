//! Filesystem artifact loader
//!
//! Reads the artifact directory once at startup. Slots load independently;
//! a failed slot is logged and left empty so the rest of the bundle still
//! comes up.

use super::{
    ArtifactBundle, ArtifactBundleBuilder, ArtifactLoader, ArtifactSlot, Classifier,
    ColumnTransformer, LogisticClassifier, OnnxClassifier,
};
use crate::error::ArtifactError;
use crate::models::ModelMetadata;
use crate::observability::StructuredLogger;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Location of every artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Directory holding the artifact files
    pub dir: PathBuf,
    pub classifier_onnx: String,
    pub classifier_json: String,
    pub preprocessor: String,
    pub feature_names: String,
    pub metadata: String,
    pub manifest: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            classifier_onnx: "classifier.onnx".to_string(),
            classifier_json: "classifier.json".to_string(),
            preprocessor: "preprocessor.json".to_string(),
            feature_names: "feature_names.json".to_string(),
            metadata: "metadata.json".to_string(),
            manifest: "manifest.json".to_string(),
        }
    }
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

/// Optional `manifest.json`: expected SHA-256 digest per artifact file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub sha256: HashMap<String, String>,
}

impl Manifest {
    /// Hex-encoded SHA-256 of a file's contents
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn verify(&self, file: &str, path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        let Some(expected) = self.sha256.get(file) else {
            return Ok(());
        };
        let found = Self::digest(bytes);
        if !expected.eq_ignore_ascii_case(&found) {
            return Err(ArtifactError::Checksum {
                path: path.to_path_buf(),
                expected: expected.clone(),
                found,
            });
        }
        Ok(())
    }
}

/// Loads the bundle from an artifact directory
#[derive(Clone)]
pub struct FsArtifactLoader {
    paths: ArtifactPaths,
    logger: StructuredLogger,
}

impl FsArtifactLoader {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            logger: StructuredLogger::new(env!("CARGO_PKG_NAME")),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    fn read(&self, file: &str, manifest: &Manifest) -> Result<Vec<u8>, ArtifactError> {
        let path = self.paths.path(file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound { path })
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        manifest.verify(file, &path, &bytes)?;
        Ok(bytes)
    }

    fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        file: &str,
        manifest: &Manifest,
    ) -> Result<T, ArtifactError> {
        let bytes = self.read(file, manifest)?;
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Parse {
            path: self.paths.path(file),
            reason: e.to_string(),
        })
    }

    fn read_manifest(&self) -> Result<Manifest, ArtifactError> {
        match self.read_json(&self.paths.manifest, &Manifest::default()) {
            Err(ArtifactError::NotFound { .. }) => Ok(Manifest::default()),
            other => other,
        }
    }

    fn load_preprocessor(&self, manifest: &Manifest) -> Result<ColumnTransformer, ArtifactError> {
        let file = &self.paths.preprocessor;
        let bytes = self.read(file, manifest)?;
        let json = String::from_utf8(bytes).map_err(|e| ArtifactError::Parse {
            path: self.paths.path(file),
            reason: e.to_string(),
        })?;
        ColumnTransformer::from_json(&json).map_err(|reason| ArtifactError::Invalid {
            path: self.paths.path(file),
            reason,
        })
    }

    fn load_feature_names(&self, manifest: &Manifest) -> Result<Vec<String>, ArtifactError> {
        let names: Vec<String> = self.read_json(&self.paths.feature_names, manifest)?;
        if names.is_empty() {
            return Err(ArtifactError::Invalid {
                path: self.paths.path(&self.paths.feature_names),
                reason: "feature list is empty".to_string(),
            });
        }
        Ok(names)
    }

    /// ONNX takes precedence; the JSON logistic export is the fallback
    fn load_classifier(
        &self,
        manifest: &Manifest,
        name: &str,
        width: Option<usize>,
    ) -> Result<(Box<dyn Classifier>, PathBuf), ArtifactError> {
        let onnx_path = self.paths.path(&self.paths.classifier_onnx);
        if onnx_path.exists() {
            let bytes = self.read(&self.paths.classifier_onnx, manifest)?;
            let width = width.ok_or_else(|| ArtifactError::Invalid {
                path: onnx_path.clone(),
                reason: "input width unknown: preprocessor and feature list both unavailable"
                    .to_string(),
            })?;
            let model = OnnxClassifier::from_bytes(name, &bytes, width).map_err(|e| {
                ArtifactError::Parse {
                    path: onnx_path.clone(),
                    reason: format!("{:#}", e),
                }
            })?;
            return Ok((Box::new(model), onnx_path));
        }

        let file = &self.paths.classifier_json;
        let path = self.paths.path(file);
        let bytes = self.read(file, manifest)?;
        let json = String::from_utf8(bytes).map_err(|e| ArtifactError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let model = LogisticClassifier::from_json(&json).map_err(|reason| {
            ArtifactError::Invalid {
                path: path.clone(),
                reason,
            }
        })?;
        if let Some(width) = width {
            if model.input_width() != width {
                return Err(ArtifactError::Invalid {
                    path,
                    reason: format!(
                        "classifier takes {} features, preprocessor produces {}",
                        model.input_width(),
                        width
                    ),
                });
            }
        }
        Ok((Box::new(model), path))
    }

    fn record<T>(
        &self,
        builder: ArtifactBundleBuilder,
        slot: ArtifactSlot,
        file: &str,
        result: Result<T, ArtifactError>,
        set: impl FnOnce(ArtifactBundleBuilder, T) -> ArtifactBundleBuilder,
    ) -> ArtifactBundleBuilder {
        match result {
            Ok(value) => {
                self.logger
                    .log_artifact_loaded(slot.as_str(), &self.paths.path(file).display().to_string());
                set(builder, value)
            }
            Err(e) => {
                self.logger.log_artifact_load_failed(slot.as_str(), &e.to_string());
                builder.failed(slot, e.to_string())
            }
        }
    }
}

impl ArtifactLoader for FsArtifactLoader {
    fn load(&self) -> ArtifactBundle {
        let mut builder = ArtifactBundle::builder();

        let manifest = match self.read_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                // without a readable manifest no slot can be trusted
                let reason = e.to_string();
                for slot in ArtifactSlot::ALL {
                    self.logger.log_artifact_load_failed(slot.as_str(), &reason);
                    builder = builder.failed(slot, reason.clone());
                }
                return builder.build();
            }
        };

        let metadata = self.read_json::<ModelMetadata>(&self.paths.metadata, &manifest);
        let model_name = metadata
            .as_ref()
            .ok()
            .and_then(|m| m.get("model_name"))
            .and_then(|v| v.as_str())
            .unwrap_or("classifier")
            .to_string();
        if let Ok(metadata) = &metadata {
            self.logger.log_model_summary(metadata);
        }
        builder = self.record(
            builder,
            ArtifactSlot::Metadata,
            &self.paths.metadata,
            metadata,
            ArtifactBundleBuilder::metadata,
        );

        let preprocessor = self.load_preprocessor(&manifest);
        builder = self.record(
            builder,
            ArtifactSlot::Preprocessor,
            &self.paths.preprocessor,
            preprocessor,
            ArtifactBundleBuilder::preprocessor,
        );

        let feature_names = self.load_feature_names(&manifest);
        builder = self.record(
            builder,
            ArtifactSlot::FeatureNames,
            &self.paths.feature_names,
            feature_names,
            ArtifactBundleBuilder::feature_names,
        );

        let width = builder.expected_width();
        match self.load_classifier(&manifest, &model_name, width) {
            Ok((classifier, path)) => {
                self.logger
                    .log_artifact_loaded(ArtifactSlot::Classifier.as_str(), &path.display().to_string());
                builder = builder.boxed_classifier(classifier);
            }
            Err(e) => {
                self.logger
                    .log_artifact_load_failed(ArtifactSlot::Classifier.as_str(), &e.to_string());
                builder = builder.failed(ArtifactSlot::Classifier, e.to_string());
            }
        }

        let bundle = builder.build();
        if bundle.is_degraded() {
            let missing: Vec<&str> = bundle.missing_required().iter().map(|s| s.as_str()).collect();
            self.logger.log_degraded(&missing);
        }
        bundle
    }
}
