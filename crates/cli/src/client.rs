//! API client for the kube gateway

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Error returned by the gateway itself, as opposed to a transport failure
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}, {kind}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn is_forbidden(&self) -> bool {
        self.status == StatusCode::FORBIDDEN
    }
}

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Troubleshooting waits on several kubectl calls.
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (kind, message) = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(err) => (err.error, err.message),
                Err(_) => ("unknown".to_string(), text),
            };
            return Err(ApiError {
                status,
                kind,
                message,
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResponse> {
        self.post("v1/execute", request).await
    }

    pub async fn troubleshoot(&self, request: &TroubleshootRequest) -> Result<DiagnosticReport> {
        self.post("v1/troubleshoot", request).await
    }

    pub async fn scan_nodes(&self, request: &NodeScanRequest) -> Result<Vec<NodeHealth>> {
        self.post("v1/nodes/scan", request).await
    }

    pub async fn failing_pods(&self, request: &FailingPodsRequest) -> Result<Vec<FailingPod>> {
        self.post("v1/pods/failing", request).await
    }
}

// Request types

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub verb: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TroubleshootRequest {
    pub pod: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeScanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailingPodsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

// Response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Milliseconds
    pub duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub remediation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCall {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub request_id: String,
    pub target: PodRef,
    pub context: String,
    #[serde(default)]
    pub observation: Option<serde_json::Value>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub log_tail: Option<String>,
    pub sub_calls: Vec<SubCall>,
    pub status: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node: String,
    pub status: String,
    pub utilization_percent: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingPod {
    pub pod: PodRef,
    pub phase: String,
    pub classification: Classification,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
}
