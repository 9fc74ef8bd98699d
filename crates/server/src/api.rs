//! HTTP API for churn predictions, health checks and Prometheus metrics

use churn_lib::{
    ChurnLabel, ChurnPredictor, ClassProbabilities, ComponentStatus, IndexedPrediction,
    PredictionFailure, PredictionResult, RawInput, Table,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

const SERVICE_NAME: &str = "Bank Churn Prediction API";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content types accepted by `/predict-csv`
const CSV_CONTENT_TYPES: &[&str] = &["text/csv", "application/csv"];

/// Shared application state
pub struct AppState {
    pub predictor: Arc<ChurnPredictor>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(predictor: Arc<ChurnPredictor>, max_upload_bytes: usize) -> Self {
        Self {
            predictor,
            max_upload_bytes,
        }
    }
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Failure turned into an HTTP response
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error,
                stage: None,
                message: message.into(),
                details: None,
            },
        }
    }
}

impl From<PredictionFailure> for ApiError {
    fn from(failure: PredictionFailure) -> Self {
        Self {
            status: status_for_kind(failure.kind()),
            body: ErrorBody {
                error: failure.kind(),
                stage: Some(failure.stage.as_str()),
                message: failure.reason(),
                details: failure.details(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "invalid_body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status for a machine-readable error kind
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "validation_error" | "computation_error" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wire shape of one prediction
#[derive(Debug, Serialize)]
struct PredictionBody {
    prediction: u8,
    prediction_label: ChurnLabel,
    probabilities: Option<ClassProbabilities>,
}

impl From<PredictionResult> for PredictionBody {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.label.class(),
            prediction_label: result.label,
            probabilities: result.probabilities,
        }
    }
}

#[derive(Debug, Serialize)]
struct SinglePredictionResponse {
    #[serde(flatten)]
    prediction: PredictionBody,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    index: usize,
    prediction: u8,
    prediction_label: ChurnLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<ClassProbabilities>,
}

impl From<IndexedPrediction> for BatchItem {
    fn from(item: IndexedPrediction) -> Self {
        Self {
            index: item.index,
            prediction: item.result.label.class(),
            prediction_label: item.result.label,
            probabilities: item.result.probabilities,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchPredictionResponse {
    count: usize,
    predictions: Vec<BatchItem>,
    timestamp: DateTime<Utc>,
}

/// Run a pipeline call off the async runtime
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ChurnPredictor) -> Result<T, ApiError> + Send + 'static,
{
    let predictor = state.predictor.clone();
    tokio::task::spawn_blocking(move || f(&predictor))
        .await
        .map_err(|e| {
            error!(error = %e, "Prediction task failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "prediction task failed",
            )
        })?
}

/// Service banner
async fn root() -> impl IntoResponse {
    Json(json!({
        "message": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "health": "/health",
        "ready": "/readyz",
        "metrics": "/metrics",
    }))
}

/// Health report - 200 while the process is up, even when degraded
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.predictor.health();
    let status_code = match report.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

/// Readiness check - 200 if predictions can be served, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.predictor.is_ready();
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state
        .predictor
        .model_metadata()
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "not_found", "model metadata not available"))
}

async fn features(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let names = state
        .predictor
        .feature_names()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "not_found", "feature names not available"))?;
    Ok(Json(json!({
        "total_features": names.len(),
        "feature_names": names,
    })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RawInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = body?;
    let result = blocking(&state, move |p| Ok(p.predict_one(&input)?)).await?;
    Ok(Json(SinglePredictionResponse {
        prediction: result.into(),
        timestamp: Utc::now(),
    }))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Vec<RawInput>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(inputs) = body?;
    let predictions = blocking(&state, move |p| Ok(p.predict_many(&inputs)?)).await?;
    Ok(Json(BatchPredictionResponse {
        count: predictions.len(),
        predictions: predictions.into_iter().map(BatchItem::from).collect(),
        timestamp: Utc::now(),
    }))
}

fn is_csv(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            CSV_CONTENT_TYPES.iter().any(|t| mime.eq_ignore_ascii_case(t))
        })
        .unwrap_or(false)
}

async fn predict_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // a degraded service answers 503 whatever was uploaded
    state.predictor.ensure_ready()?;

    if !is_csv(&headers) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_content_type",
            "the upload must be a CSV file (Content-Type: text/csv)",
        ));
    }

    let csv = blocking(&state, move |p| {
        let table = Table::from_csv_reader(body.as_ref())
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_csv", e.to_string()))?;
        info!(rows = table.n_rows(), columns = table.columns().len(), "CSV received");
        let scored = p.predict_table(&table)?;
        scored.to_csv_string().map_err(|e| {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "formatting_error", e.to_string())
        })
    })
    .await?;

    let filename = format!("churn_predictions_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        csv,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/model-info", get(model_info))
        .route("/features", get(features))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .route("/predict-csv", post(predict_csv))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
