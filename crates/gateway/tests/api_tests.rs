//! Integration tests for the gateway API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use gateway_lib::{
    gateway::RawOutput,
    health::{components, HealthRegistry},
    ClusterContext, CommandGateway, CommandRunner, SafetyPolicy, StaticResolver,
    TroubleshootConfig, Troubleshooter,
};
use kube_gateway::api::{create_router, AppState, PROHIBITED_MESSAGE};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const POD_JSON: &str = r#"{
    "metadata": {"name": "web", "namespace": "default"},
    "status": {
        "phase": "Running",
        "containerStatuses": [{
            "name": "app",
            "restartCount": 4,
            "state": {"waiting": {"reason": "CrashLoopBackOff"}}
        }]
    }
}"#;

/// Answers like kubectl would for a cluster with one crash-looping pod
#[derive(Default)]
struct FakeKubectl {
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeKubectl {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for FakeKubectl {
    async fn invoke(
        &self,
        argv: &[String],
        _context: &ClusterContext,
        _timeout: Duration,
    ) -> gateway_lib::Result<RawOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());

        let has = |token: &str| argv.iter().any(|a| a == token);
        let pod_list = format!(r#"{{"kind": "List", "items": [{}]}}"#, POD_JSON);
        let (exit_code, stdout, stderr) = if has("missing") {
            (1, "", "Error from server (NotFound): pods \"missing\" not found")
        } else if has("logs") {
            (0, "starting\npanic: boom\n", "")
        } else if has("events") {
            (0, r#"{"items": []}"#, "")
        } else if has("pods") && has("-o") {
            (0, pod_list.as_str(), "")
        } else if has("-o") {
            (0, POD_JSON, "")
        } else {
            (0, "NAME   READY   STATUS\nweb    0/1     CrashLoopBackOff\n", "")
        };

        Ok(RawOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }
}

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<FakeKubectl>) {
    let runner = Arc::new(FakeKubectl::default());
    let gateway = Arc::new(CommandGateway::new(
        Arc::new(SafetyPolicy::read_only()),
        runner.clone(),
        Duration::from_secs(5),
    ));
    let troubleshooter = Arc::new(Troubleshooter::new(
        Arc::clone(&gateway),
        TroubleshootConfig::default(),
    ));

    let health_registry = HealthRegistry::new();
    health_registry.set_healthy(components::KUBECTL).await;

    let state = Arc::new(AppState {
        gateway,
        troubleshooter,
        resolver: Arc::new(StaticResolver::new().with_context(ClusterContext::new("prod"))),
        health_registry,
        memory_threshold_percent: 80.0,
    });

    (create_router(state.clone()), state, runner)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_execute_read_command() {
    let (app, _state, runner) = setup_test_app().await;

    let (status, body) = post(
        app,
        "/v1/execute",
        json!({"verb": "get", "resource": "pods", "namespace": "default"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exit_code"], 0);
    assert!(body["stdout"].as_str().unwrap().contains("CrashLoopBackOff"));
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn test_execute_blocked_verb_is_forbidden() {
    let (app, _state, runner) = setup_test_app().await;

    let (status, body) = post(
        app,
        "/v1/execute",
        json!({"verb": " Delete ", "resource": "pod", "name": "web", "requested_by": "U123"}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "policy_violation");
    assert_eq!(body["message"], PROHIBITED_MESSAGE);
    assert_eq!(body["verb"], "delete");
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_execute_empty_verb_is_bad_request() {
    let (app, _state, _runner) = setup_test_app().await;
    let (status, body) = post(app, "/v1/execute", json!({"verb": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_execute_failure_is_bad_gateway() {
    let (app, _state, _runner) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/execute",
        json!({"verb": "describe", "resource": "pod", "name": "missing"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains("NotFound"));
}

#[tokio::test]
async fn test_unknown_context_is_not_found() {
    let (app, _state, runner) = setup_test_app().await;
    let (status, _) = post(
        app,
        "/v1/troubleshoot",
        json!({"pod": "web", "context": "staging"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_classify_endpoint() {
    let (app, _state, _runner) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/classify",
        json!({
            "name": "web",
            "namespace": "default",
            "phase": "Running",
            "containers": [{
                "name": "app",
                "last_termination_reason": "OOMKilled",
                "waiting_reason": "ImagePullBackOff"
            }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "OOMKilled");
    assert_eq!(body["confidence"], 0.95);
}

#[tokio::test]
async fn test_evaluate_endpoint_boundary() {
    let (app, _state, _runner) = setup_test_app().await;
    let node = |used: u64| {
        json!({
            "node": {
                "name": "node-a",
                "allocatable_memory_bytes": 100,
                "used_memory_bytes": used,
                "ready": "True"
            },
            "threshold_percent": 80.0
        })
    };

    let (_, at) = post(app.clone(), "/v1/evaluate", node(80)).await;
    assert_eq!(at["status"], "Warning");

    let (_, below) = post(app, "/v1/evaluate", node(79)).await;
    assert_eq!(below["status"], "Healthy");
}

#[tokio::test]
async fn test_troubleshoot_endpoint() {
    let (app, _state, runner) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/troubleshoot",
        json!({"pod": "web", "requested_by": "U123"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["context"], "prod");
    assert_eq!(body["classification"]["category"], "CrashLoop");
    assert_eq!(body["sub_calls"].as_array().unwrap().len(), 3);
    assert_eq!(runner.call_count(), 3);
}

#[tokio::test]
async fn test_troubleshoot_missing_pod_is_partial_report() {
    let (app, _state, _runner) = setup_test_app().await;
    let (status, body) = post(app, "/v1/troubleshoot", json!({"pod": "missing"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial");
    assert_eq!(body["classification"]["category"], "Unknown");
    assert!(body["observation"].is_null());
}

#[tokio::test]
async fn test_failing_pods_endpoint() {
    let (app, _state, _runner) = setup_test_app().await;
    let (status, body) = post(app, "/v1/pods/failing", json!({"namespace": "default"})).await;

    assert_eq!(status, StatusCode::OK);
    let pods = body.as_array().unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0]["pod"]["name"], "web");
    assert_eq!(pods[0]["classification"]["category"], "CrashLoop");
    assert_eq!(pods[0]["reasons"][0], "Container 'app' is waiting: CrashLoopBackOff");
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let (app, state, _runner) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"kubectl\""));

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    state
        .health_registry
        .set_unhealthy(components::KUBECTL, "kubectl not found")
        .await;
    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_counts_blocked_commands() {
    let (app, _state, _runner) = setup_test_app().await;

    post(app.clone(), "/v1/execute", json!({"verb": "drain", "name": "node-a"})).await;

    let (status, text) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("kube_gateway_commands_blocked_total"));
    assert!(text.contains("verb=\"drain\""));
}
