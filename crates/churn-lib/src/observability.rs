//! Observability infrastructure for the churn prediction service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, request/failure counts, rows scored,
//!   feature width mismatches, artifact slot state)
//! - Structured JSON logging with tracing

use crate::models::ModelMetadata;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    prediction_latency_seconds: HistogramVec,
    prediction_requests: IntCounterVec,
    prediction_failures: IntCounterVec,
    rows_scored: IntCounter,
    feature_width_mismatches: IntCounter,
    artifact_loaded: IntGaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram_vec!(
                "churn_prediction_latency_seconds",
                "End-to-end pipeline latency per request",
                &["shape"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            prediction_requests: register_int_counter_vec!(
                "churn_prediction_requests_total",
                "Prediction requests received, by request shape",
                &["shape"]
            )
            .expect("Failed to register prediction_requests"),

            prediction_failures: register_int_counter_vec!(
                "churn_prediction_failures_total",
                "Failed prediction requests, by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_failures"),

            rows_scored: register_int_counter!(
                "churn_rows_scored_total",
                "Customer records scored by the classifier"
            )
            .expect("Failed to register rows_scored"),

            feature_width_mismatches: register_int_counter!(
                "churn_feature_width_mismatches_total",
                "Transformed batches whose width differed from the recorded feature list"
            )
            .expect("Failed to register feature_width_mismatches"),

            artifact_loaded: register_int_gauge_vec!(
                "churn_artifact_loaded",
                "Whether each artifact slot is loaded (1) or unavailable (0)",
                &["slot"]
            )
            .expect("Failed to register artifact_loaded"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn inc_requests(&self, shape: &str) {
        self.inner().prediction_requests.with_label_values(&[shape]).inc();
    }

    pub fn observe_latency(&self, shape: &str, duration_secs: f64) {
        self.inner()
            .prediction_latency_seconds
            .with_label_values(&[shape])
            .observe(duration_secs);
    }

    pub fn inc_failures(&self, kind: &str) {
        self.inner().prediction_failures.with_label_values(&[kind]).inc();
    }

    pub fn add_rows_scored(&self, rows: usize) {
        self.inner().rows_scored.inc_by(rows as u64);
    }

    pub fn inc_feature_width_mismatches(&self) {
        self.inner().feature_width_mismatches.inc();
    }

    pub fn set_artifact_loaded(&self, slot: &str, loaded: bool) {
        self.inner()
            .artifact_loaded
            .with_label_values(&[slot])
            .set(i64::from(loaded));
    }
}

/// Structured logger for service events
///
/// Consistent JSON-formatted events for artifact loading, predictions and
/// failures.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_name: Option<&str>, degraded: bool) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            model_name = model_name.unwrap_or("unknown"),
            degraded = degraded,
            "Churn prediction service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Churn prediction service shutting down"
        );
    }

    pub fn log_artifact_loaded(&self, slot: &str, path: &str) {
        info!(
            event = "artifact_loaded",
            service = %self.service,
            slot = %slot,
            path = %path,
            "Artifact loaded"
        );
    }

    pub fn log_artifact_load_failed(&self, slot: &str, reason: &str) {
        warn!(
            event = "artifact_load_failed",
            service = %self.service,
            slot = %slot,
            reason = %reason,
            "Artifact failed to load, slot left empty"
        );
    }

    /// Log the descriptive model metrics bundled with the artifacts
    pub fn log_model_summary(&self, metadata: &ModelMetadata) {
        let metrics = metadata.get("metrics");
        let metric = |name: &str| metrics.and_then(|m| m.get(name)).and_then(|v| v.as_f64());
        info!(
            event = "model_summary",
            service = %self.service,
            model_name = metadata.get("model_name").and_then(|v| v.as_str()).unwrap_or("unknown"),
            roc_auc = ?metric("roc_auc"),
            f1_score = ?metric("f1_score"),
            "Model metadata loaded"
        );
    }

    pub fn log_degraded(&self, missing: &[&str]) {
        warn!(
            event = "service_degraded",
            service = %self.service,
            missing = ?missing,
            "Required artifacts unavailable, predictions will be refused"
        );
    }

    pub fn log_prediction(&self, shape: &str, rows: usize, churned: usize, elapsed_ms: f64) {
        info!(
            event = "prediction_served",
            service = %self.service,
            shape = %shape,
            rows = rows,
            churned = churned,
            elapsed_ms = elapsed_ms,
            "Prediction served"
        );
    }

    pub fn log_prediction_failed(&self, shape: &str, stage: &str, kind: &str, reason: &str) {
        warn!(
            event = "prediction_failed",
            service = %self.service,
            shape = %shape,
            stage = %stage,
            kind = %kind,
            reason = %reason,
            "Prediction request failed"
        );
    }

    pub fn log_feature_width_mismatch(&self, expected: usize, actual: usize, strict: bool) {
        warn!(
            event = "feature_width_mismatch",
            service = %self.service,
            expected = expected,
            actual = actual,
            strict = strict,
            "Transformed feature width differs from the recorded feature list"
        );
    }
}
