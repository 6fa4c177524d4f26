//! HTTP API exposing the gateway operations, health checks and metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gateway_lib::{
    health::{ComponentStatus, HealthRegistry},
    node_health, ClusterContext, CommandGateway, CommandSpec, ContextResolver, DiagnosticReport,
    ExecutionResult, FailingPod, FailureClassification, GatewayError, NodeHealth,
    NodeObservation, PodObservation, PodRef, Troubleshooter,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Message returned for every policy rejection
pub const PROHIBITED_MESSAGE: &str =
    "This action is prohibited for security reasons. The attempt has been logged.";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CommandGateway>,
    pub troubleshooter: Arc<Troubleshooter>,
    pub resolver: Arc<dyn ContextResolver>,
    pub health_registry: HealthRegistry,
    pub memory_threshold_percent: f64,
}

impl AppState {
    fn context(&self, name: Option<&str>) -> Result<ClusterContext, ApiError> {
        Ok(self.resolver.resolve(name)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub verb: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub node: NodeObservation,
    #[serde(default)]
    pub threshold_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TroubleshootRequest {
    pub pod: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NodeScanRequest {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub threshold_percent: Option<f64>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailingPodsRequest {
    /// All namespaces when absent
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
}

/// Gateway errors mapped onto HTTP responses
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, verb) = match &self.0 {
            GatewayError::PolicyViolation { verb, .. } => {
                (StatusCode::FORBIDDEN, "policy_violation", Some(verb.clone()))
            }
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request", None),
            GatewayError::Execution { .. } => (StatusCode::BAD_GATEWAY, "execution_error", None),
            GatewayError::Parse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "parse_error", None),
            GatewayError::Kubeconfig(_) | GatewayError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let message = match &self.0 {
            GatewayError::PolicyViolation { .. } => PROHIBITED_MESSAGE.to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = ErrorBody {
            error: kind.to_string(),
            message,
            verb,
        };
        (status, Json(body)).into_response()
    }
}

async fn execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let context = state.context(req.context.as_deref())?;

    let mut spec = CommandSpec::new(req.verb, context).args(req.args);
    if let Some(resource) = req.resource {
        spec = spec.resource(resource);
    }
    if let Some(name) = req.name {
        spec = spec.name(name);
    }
    if let Some(namespace) = req.namespace {
        spec = spec.namespace(namespace);
    }

    let result = state
        .gateway
        .execute_as(spec, req.requested_by.as_deref())
        .await?;
    Ok(Json(result))
}

async fn classify(
    State(state): State<Arc<AppState>>,
    Json(obs): Json<PodObservation>,
) -> Json<FailureClassification> {
    Json(state.troubleshooter.classifier().classify(&obs))
}

async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Json<NodeHealth> {
    let threshold = req
        .threshold_percent
        .unwrap_or(state.memory_threshold_percent);
    Json(node_health::evaluate(&req.node, threshold))
}

async fn troubleshoot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TroubleshootRequest>,
) -> Result<Json<DiagnosticReport>, ApiError> {
    if req.pod.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("pod name is empty".to_string()).into());
    }
    let context = state.context(req.context.as_deref())?;

    let report = state
        .troubleshooter
        .troubleshoot_as(
            PodRef::new(req.pod, req.namespace),
            context,
            req.requested_by.as_deref(),
        )
        .await;
    Ok(Json(report))
}

async fn scan_nodes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NodeScanRequest>,
) -> Result<Json<Vec<NodeHealth>>, ApiError> {
    let context = state.context(req.context.as_deref())?;
    let threshold = req
        .threshold_percent
        .unwrap_or(state.memory_threshold_percent);

    let verdicts = state
        .troubleshooter
        .scan_nodes(&context, threshold, req.requested_by.as_deref())
        .await?;
    Ok(Json(verdicts))
}

async fn failing_pods(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FailingPodsRequest>,
) -> Result<Json<Vec<FailingPod>>, ApiError> {
    let context = state.context(req.context.as_deref())?;

    let pods = state
        .troubleshooter
        .failing_pods(
            req.namespace.as_deref(),
            &context,
            req.requested_by.as_deref(),
        )
        .await?;
    Ok(Json(pods))
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/execute", post(execute))
        .route("/v1/classify", post(classify))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/troubleshoot", post(troubleshoot))
        .route("/v1/nodes/scan", post(scan_nodes))
        .route("/v1/pods/failing", post(failing_pods))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
