//! Integration tests for the churn server API endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use churn_lib::{
    artifacts::{ArtifactLoader, ArtifactPaths, FsArtifactLoader},
    ChurnPredictor, PipelineConfig,
};
use churn_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../churn-lib/tests/fixtures")
}

fn app_for(dir: &Path) -> Router {
    let bundle = FsArtifactLoader::new(ArtifactPaths::in_dir(dir)).load();
    let predictor = ChurnPredictor::new(Arc::new(bundle), PipelineConfig::default());
    create_router(Arc::new(AppState::new(Arc::new(predictor), 1024 * 1024)))
}

fn setup_test_app() -> Router {
    app_for(&fixtures().join("artifacts"))
}

fn customer() -> Value {
    json!({
        "Customer_Age": 45,
        "Gender": "M",
        "Dependent_count": 3,
        "Education_Level": "Graduate",
        "Marital_Status": "Married",
        "Income_Category": "$60K - $80K",
        "Card_Category": "Blue",
        "Months_on_book": 39,
        "Total_Relationship_Count": 5,
        "Months_Inactive_12_mon": 1,
        "Contacts_Count_12_mon": 3,
        "Credit_Limit": 12691.0,
        "Total_Revolving_Bal": 777,
        "Avg_Open_To_Buy": 11914.0,
        "Total_Amt_Chng_Q4_Q1": 1.335,
        "Total_Trans_Amt": 1144,
        "Total_Trans_Ct": 42,
        "Total_Ct_Chng_Q4_Q1": 1.625,
        "Avg_Utilization_Ratio": 0.061
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_root_banner() {
    let (status, body) = get(setup_test_app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    let banner: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(banner["message"], "Bank Churn Prediction API");
}

#[tokio::test]
async fn test_health_reports_healthy() {
    let (status, body) = get(setup_test_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["classifier"]["status"], "healthy");
    assert_eq!(health["model_name"], "LogisticRegression");
}

#[tokio::test]
async fn test_health_ok_but_not_ready_when_degraded() {
    let empty = TempDir::new().unwrap();

    let (status, body) = get(app_for(empty.path()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");

    let (status, body) = get(app_for(empty.path()), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["classifier_loaded"], false);
}

#[tokio::test]
async fn test_readyz_ok_when_loaded() {
    let (status, body) = get(setup_test_app(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
    assert_eq!(readiness["feature_list_loaded"], true);
}

#[tokio::test]
async fn test_model_info_and_features() {
    let (status, body) = get(setup_test_app(), "/model-info").await;
    assert_eq!(status, StatusCode::OK);
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["metrics"]["f1_score"], 0.701);

    let (status, body) = get(setup_test_app(), "/features").await;
    assert_eq!(status, StatusCode::OK);
    let features: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(features["total_features"], 40);
    assert_eq!(features["feature_names"][0], "num__customer_age");
}

#[tokio::test]
async fn test_model_info_404_when_absent() {
    let empty = TempDir::new().unwrap();
    let (status, _) = get(app_for(empty.path()), "/model-info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(app_for(empty.path()), "/features").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict_single() {
    let (status, body) = post_json(setup_test_app(), "/predict", &customer()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], 0);
    assert_eq!(body["prediction_label"], "Non-Churn");
    let churn = body["probabilities"]["churn"].as_f64().unwrap();
    let non_churn = body["probabilities"]["non_churn"].as_f64().unwrap();
    assert!((churn + non_churn - 1.0).abs() < 1e-9);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_predict_validation_error_is_422() {
    let mut input = customer();
    input["Customer_Age"] = json!(150);
    let (status, body) = post_json(setup_test_app(), "/predict", &input).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["stage"], "validating");
    assert_eq!(body["details"][0]["field"], "customer_age");
    assert_eq!(body["details"][0]["constraint"], "out_of_range");
}

#[tokio::test]
async fn test_predict_computation_error_is_422() {
    let mut input = customer();
    input["Credit_Limit"] = json!(0.0);
    let (status, body) = post_json(setup_test_app(), "/predict", &input).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "computation_error");
}

#[tokio::test]
async fn test_predict_503_when_degraded() {
    let empty = TempDir::new().unwrap();
    let (status, body) = post_json(app_for(empty.path()), "/predict", &customer()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service_unavailable");

    let (status, _) = post_json(app_for(empty.path()), "/predict-batch", &json!([customer()])).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_csv_503_when_degraded_for_any_upload() {
    let empty = TempDir::new().unwrap();
    let uploads = [
        ("text/csv", "a,b\n1,2,3\n"),
        ("application/json", "{}"),
        ("text/csv", "Customer_Age\n45\n"),
    ];

    for (content_type, body) in uploads {
        let request = Request::builder()
            .method("POST")
            .uri("/predict-csv")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let (status, body) = send(app_for(empty.path()), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "service_unavailable");
        assert_eq!(body["stage"], "readiness");
    }
}

#[tokio::test]
async fn test_predict_rejects_non_object_body() {
    let (status, body) = post_json(setup_test_app(), "/predict", &json!([1, 2, 3])).await;
    assert!(status.is_client_error());
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn test_predict_batch_preserves_order() {
    let mut second = customer();
    second["Total_Trans_Ct"] = json!(20);
    let batch = json!([customer(), second, customer()]);

    let (status, body) = post_json(setup_test_app(), "/predict-batch", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    let predictions = body["predictions"].as_array().unwrap();
    for (i, item) in predictions.iter().enumerate() {
        assert_eq!(item["index"], i);
    }
    assert_eq!(predictions[0]["probabilities"], predictions[2]["probabilities"]);

    let (_, single) = post_json(setup_test_app(), "/predict", &customer()).await;
    assert_eq!(predictions[0]["probabilities"], single["probabilities"]);
}

#[tokio::test]
async fn test_predict_batch_empty_list() {
    let (status, body) = post_json(setup_test_app(), "/predict-batch", &json!([])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_predict_csv_returns_annotated_table() {
    let csv = std::fs::read_to_string(fixtures().join("customers.csv")).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/predict-csv")
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from(csv.clone()))
        .unwrap();

    let response = setup_test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=churn_predictions_"));
    assert!(disposition.ends_with(".csv"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let out = String::from_utf8(body.to_vec()).unwrap();
    let mut lines = out.lines();
    let header_line = lines.next().unwrap();
    assert!(header_line.starts_with("CLIENTNUM,Attrition_Flag,"));
    assert!(header_line.ends_with(",churn_prediction,proba_non_churn,proba_churn"));
    assert_eq!(lines.count(), csv.lines().count() - 1);
}

#[tokio::test]
async fn test_predict_csv_rejects_other_content_types() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict-csv")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(setup_test_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "invalid_content_type");
}

#[tokio::test]
async fn test_predict_csv_malformed_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict-csv")
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from("a,b\n1,2,3\n"))
        .unwrap();
    let (status, body) = send(setup_test_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "invalid_csv");
}

#[tokio::test]
async fn test_predict_csv_rescores_its_own_output() {
    let csv = std::fs::read_to_string(fixtures().join("customers.csv")).unwrap();
    let upload = |body: String| {
        Request::builder()
            .method("POST")
            .uri("/predict-csv")
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(body))
            .unwrap()
    };

    let (status, first) = send(setup_test_app(), upload(csv)).await;
    assert_eq!(status, StatusCode::OK);
    let first = String::from_utf8(first).unwrap();

    let (status, second) = send(setup_test_app(), upload(first.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(second).unwrap(), first);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    // serve one prediction so the counters exist
    let _ = post_json(setup_test_app(), "/predict", &customer()).await;

    let (status, body) = get(setup_test_app(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("churn_prediction_requests_total"));
    assert!(text.contains("churn_artifact_loaded"));
}
