//! API client for communicating with the churn prediction service

use anyhow::{Context, Result};
use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Error returned by the service, decoded from its error body
#[derive(Debug, thiserror::Error)]
#[error("{kind} ({status}): {message}")]
pub struct ServiceError {
    pub status: StatusCode,
    pub kind: String,
    pub stage: Option<String>,
    pub message: String,
    pub details: Option<Value>,
}

impl ServiceError {
    fn from_body(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) => Self {
                status,
                kind: err.error,
                stage: err.stage,
                message: err.message,
                details: err.details,
            },
            Err(_) => Self {
                status,
                kind: "http_error".to_string(),
                stage: None,
                message: body.to_string(),
                details: None,
            },
        }
    }
}

/// API client for the churn prediction service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        checked(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// GET a status document whose body is meaningful on 503 as well
    pub async fn get_status<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.json().await.context("Failed to parse response")?;
            return Ok((status, body));
        }
        let body = checked(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")?;
        Ok((status, body))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        checked(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Upload a CSV document and return the annotated CSV
    pub async fn post_csv(&self, path: &str, csv: Vec<u8>) -> Result<String> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "text/csv")
            .body(csv)
            .send()
            .await
            .context("Failed to send request")?;

        checked(response)
            .await?
            .text()
            .await
            .context("Failed to read response")
    }
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::from_body(status, &body).into())
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub classifier_loaded: bool,
    pub preprocessor_loaded: bool,
    pub feature_list_loaded: bool,
    pub metadata_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureList {
    pub total_features: usize,
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Probabilities {
    pub non_churn: f64,
    pub churn: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePrediction {
    pub prediction: u8,
    pub prediction_label: String,
    #[serde(default)]
    pub probabilities: Option<Probabilities>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub prediction: u8,
    pub prediction_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub count: usize,
    pub predictions: Vec<BatchItem>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_features() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/features")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"total_features": 2, "feature_names": ["num__a", "cat__b_x"]}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let features: FeatureList = client.get("features").await.unwrap();

        mock.assert_async().await;
        assert_eq!(features.total_features, 2);
        assert_eq!(features.feature_names[1], "cat__b_x");
    }

    #[tokio::test]
    async fn test_service_error_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": "validation_error",
                    "stage": "validating",
                    "message": "1 invalid field",
                    "details": [{"field": "customer_age", "constraint": "out_of_range"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post::<SinglePrediction, _>("predict", &json!({"customer_age": 150}))
            .await
            .unwrap_err();

        let err = err.downcast::<ServiceError>().unwrap();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind, "validation_error");
        assert_eq!(err.stage.as_deref(), Some("validating"));
        assert_eq!(err.details.unwrap()[0]["field"], "customer_age");
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/model-info")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.get::<Value>("model-info").await.unwrap_err();
        let err = err.downcast::<ServiceError>().unwrap();
        assert_eq!(err.kind, "http_error");
        assert_eq!(err.message, "bad gateway");
    }

    #[tokio::test]
    async fn test_readiness_body_on_503() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "ready": false,
                    "classifier_loaded": false,
                    "preprocessor_loaded": true,
                    "feature_list_loaded": true,
                    "metadata_loaded": true,
                    "reason": "missing required artifacts: classifier"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, readiness): (_, Readiness) = client.get_status("readyz").await.unwrap();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!readiness.ready);
        assert!(!readiness.classifier_loaded);
    }

    #[tokio::test]
    async fn test_post_csv_sends_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict-csv")
            .match_header("content-type", "text/csv")
            .match_body("a,b\n1,2\n")
            .with_status(200)
            .with_header("content-type", "text/csv")
            .with_body("a,b,churn_prediction\n1,2,0\n")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let out = client
            .post_csv("predict-csv", b"a,b\n1,2\n".to_vec())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(out.starts_with("a,b,churn_prediction"));
    }
}
