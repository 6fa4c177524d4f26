//! Troubleshooting orchestration
//!
//! Composes several read-only gateway calls into one [`DiagnosticReport`].
//! Sub-queries run concurrently in a bounded task group; each has its own
//! timeout and the whole group shares a request deadline. A failed or
//! cancelled sub-query becomes a degraded outcome, never an error, so a
//! report is always produced.

use crate::classifier::{Classifier, ClassifierConfig};
use crate::error::{GatewayError, Result};
use crate::failing;
use crate::gateway::CommandGateway;
use crate::models::{
    ClusterContext, CommandSpec, DiagnosticReport, ExecutionResult, FailingPod,
    FailureCategory, FailureClassification, NodeHealth, PodObservation, PodRef, ReportStatus,
    SubCallOutcome,
};
use crate::node_health;
use crate::observability::{AuditLogger, GatewayMetrics};
use crate::parser;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reason recorded for sub-queries cancelled by the request deadline
pub const DEADLINE_EXCEEDED: &str = "request deadline exceeded";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroubleshootConfig {
    /// Timeout for each individual sub-query
    pub sub_query_timeout: Duration,
    /// Deadline for the whole troubleshooting request
    pub request_timeout: Duration,
    /// Maximum concurrent CLI invocations per request
    pub max_concurrency: usize,
    pub log_tail_lines: u32,
    pub classifier: ClassifierConfig,
}

impl Default for TroubleshootConfig {
    fn default() -> Self {
        Self {
            sub_query_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(45),
            max_concurrency: 4,
            log_tail_lines: 50,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Independent sub-queries of one troubleshooting request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SubQuery {
    Status,
    Events,
    Logs,
}

impl SubQuery {
    const ALL: [SubQuery; 3] = [SubQuery::Status, SubQuery::Events, SubQuery::Logs];

    fn name(self) -> &'static str {
        match self {
            SubQuery::Status => "status",
            SubQuery::Events => "events",
            SubQuery::Logs => "logs",
        }
    }

    fn spec(self, target: &PodRef, context: &ClusterContext, tail: u32) -> CommandSpec {
        let spec = match self {
            SubQuery::Status => CommandSpec::new("get", context.clone())
                .resource("pod")
                .name(&target.name)
                .args(["-o", "json"]),
            SubQuery::Events => CommandSpec::new("get", context.clone())
                .resource("events")
                .args([
                    "--field-selector".to_string(),
                    format!("involvedObject.name={}", target.name),
                    "-o".to_string(),
                    "json".to_string(),
                ]),
            SubQuery::Logs => CommandSpec::new("logs", context.clone())
                .name(&target.name)
                .args(["--all-containers".to_string(), "--tail".to_string(), tail.to_string()]),
        };
        spec.namespace(&target.namespace)
    }
}

/// Parsed output of a successful sub-query
enum SubQueryData {
    Status(PodObservation),
    Events(PodObservation),
    Logs(String),
}

pub struct Troubleshooter {
    gateway: Arc<CommandGateway>,
    config: TroubleshootConfig,
    classifier: Classifier,
    metrics: GatewayMetrics,
    audit: AuditLogger,
}

impl Troubleshooter {
    pub fn new(gateway: Arc<CommandGateway>, config: TroubleshootConfig) -> Self {
        Self {
            gateway,
            classifier: Classifier::with_config(config.classifier),
            config,
            metrics: GatewayMetrics::new(),
            audit: AuditLogger::new("kube-gateway"),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &TroubleshootConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn troubleshoot(&self, target: PodRef, context: ClusterContext) -> DiagnosticReport {
        self.troubleshoot_as(target, context, None).await
    }

    /// Build a diagnostic report for one pod. Never fails.
    pub async fn troubleshoot_as(
        &self,
        target: PodRef,
        context: ClusterContext,
        requested_by: Option<&str>,
    ) -> DiagnosticReport {
        let request_id = uuid::Uuid::new_v4();
        debug!(%request_id, pod = %target, context = %context.name, "Troubleshooting pod");

        let (results, deadline_hit) = self.run_sub_queries(&target, &context, requested_by).await;
        let window = self.config.classifier.event_window;

        let mut sub_calls = Vec::with_capacity(SubQuery::ALL.len());
        let mut status_obs = None;
        let mut status_failure = None;
        let mut events_obs = None;
        let mut log_tail = None;

        for query in SubQuery::ALL {
            let parsed = match results.get(&query) {
                Some(Ok(result)) => parse_sub_query(query, result, &target, window),
                Some(Err(e)) => Err(e.degraded_reason()),
                None if deadline_hit => Err(DEADLINE_EXCEEDED.to_string()),
                None => Err("sub-query task terminated unexpectedly".to_string()),
            };

            match parsed {
                Ok(SubQueryData::Status(obs)) => status_obs = Some(obs),
                Ok(SubQueryData::Events(obs)) => events_obs = Some(obs),
                Ok(SubQueryData::Logs(logs)) => log_tail = Some(logs),
                Err(reason) => {
                    warn!(%request_id, sub_call = query.name(), reason = %reason, "Sub-query degraded");
                    self.metrics.inc_degraded_sub_call(query.name());
                    if query == SubQuery::Status {
                        status_failure = Some(reason.clone());
                    }
                    sub_calls.push(SubCallOutcome::degraded(query.name(), reason));
                    continue;
                }
            }
            sub_calls.push(SubCallOutcome::ok(query.name()));
        }

        let (observation, classification) = match status_obs {
            Some(obs) => {
                let merged = match events_obs {
                    Some(events) => obs.merge(events, window),
                    None => obs,
                };
                let classification = self.classifier.classify(&merged);
                (Some(merged), classification)
            }
            None => {
                let reason = status_failure.unwrap_or_else(|| "unavailable".to_string());
                (
                    None,
                    FailureClassification::unknown(format!("Pod status unavailable: {}", reason)),
                )
            }
        };

        let status = if sub_calls.iter().all(SubCallOutcome::is_ok) {
            ReportStatus::Complete
        } else {
            ReportStatus::Partial
        };

        let report = DiagnosticReport {
            request_id,
            target,
            context: context.name,
            observation,
            classification: Some(classification),
            log_tail,
            sub_calls,
            status,
            generated_at: Utc::now(),
        };

        self.metrics.inc_report(status);
        self.audit.for_requester(requested_by).log_report(&report);
        report
    }

    /// Run every sub-query concurrently under the request deadline.
    /// Returns the collected results and whether the deadline expired.
    async fn run_sub_queries(
        &self,
        target: &PodRef,
        context: &ClusterContext,
        requested_by: Option<&str>,
    ) -> (HashMap<SubQuery, Result<ExecutionResult>>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for query in SubQuery::ALL {
            let spec = query.spec(target, context, self.config.log_tail_lines);
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.config.sub_query_timeout;
            let requested_by = requested_by.map(str::to_string);

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                let result = gateway
                    .execute_with_timeout(spec, timeout, requested_by.as_deref())
                    .await;
                (query, result)
            });
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let mut results = HashMap::new();
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((query, result)))) => {
                    results.insert(query, result);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Sub-query task failed"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = tasks.len(),
                        "Request deadline exceeded, cancelling sub-queries"
                    );
                    // Aborted tasks drop their child processes, which kills them.
                    tasks.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }

        (results, deadline_hit)
    }

    /// Evaluate every node's health against a memory threshold.
    ///
    /// Usage metrics are optional: without them every node is still
    /// evaluated from its conditions, with usage marked unreported.
    pub async fn scan_nodes(
        &self,
        context: &ClusterContext,
        threshold_percent: f64,
        requested_by: Option<&str>,
    ) -> Result<Vec<NodeHealth>> {
        let nodes_spec = CommandSpec::new("get", context.clone())
            .resource("nodes")
            .args(["-o", "json"]);
        let top_spec = CommandSpec::new("top", context.clone())
            .resource("nodes")
            .arg("--no-headers");
        let timeout = self.config.sub_query_timeout;

        let (nodes, top) = tokio::join!(
            self.gateway.execute_with_timeout(nodes_spec, timeout, requested_by),
            self.gateway.execute_with_timeout(top_spec, timeout, requested_by),
        );

        let mut observations = parser::parse_nodes(&nodes?.stdout)?;
        let usage = match top {
            Ok(result) => parser::parse_top_nodes(&result.stdout),
            Err(e) => {
                warn!(
                    context = %context.name,
                    reason = %e.degraded_reason(),
                    "Node metrics unavailable, is metrics-server installed?"
                );
                HashMap::new()
            }
        };

        for node in &mut observations {
            node.used_memory_bytes = usage.get(&node.name).copied();
        }

        let mut verdicts: Vec<NodeHealth> = observations
            .iter()
            .map(|obs| node_health::evaluate(obs, threshold_percent))
            .collect();
        verdicts.sort_by(|a, b| {
            b.status
                .cmp(&a.status)
                .then(b.utilization_percent.total_cmp(&a.utilization_percent))
                .then_with(|| a.node.cmp(&b.node))
        });

        info!(
            context = %context.name,
            nodes = verdicts.len(),
            metrics = !usage.is_empty(),
            "Node scan completed"
        );
        Ok(verdicts)
    }

    /// Classify every pod in `namespace` (all namespaces when `None`) and
    /// return the ones that are failing: a known failure signature, or a
    /// status signal from [`failing::failure_reasons`]
    pub async fn failing_pods(
        &self,
        namespace: Option<&str>,
        context: &ClusterContext,
        requested_by: Option<&str>,
    ) -> Result<Vec<FailingPod>> {
        let spec = CommandSpec::new("get", context.clone())
            .resource("pods")
            .args(["-o", "json"]);
        let spec = match namespace {
            Some(ns) => spec.namespace(ns),
            None => spec.arg("--all-namespaces"),
        };

        let result = self
            .gateway
            .execute_with_timeout(spec, self.config.sub_query_timeout, requested_by)
            .await?;
        let pods = parser::parse_pod_list(&result.stdout)?;

        let failing: Vec<FailingPod> = pods
            .into_iter()
            .filter_map(|obs| {
                let classification = self.classifier.classify(&obs);
                let reasons = failing::failure_reasons(&obs);
                (classification.category != FailureCategory::Unknown || !reasons.is_empty()).then(
                    || FailingPod {
                        pod: PodRef::new(obs.name, obs.namespace),
                        phase: obs.phase,
                        classification,
                        reasons,
                    },
                )
            })
            .collect();

        debug!(context = %context.name, failing = failing.len(), "Failing pod scan completed");
        Ok(failing)
    }
}

fn parse_sub_query(
    query: SubQuery,
    result: &ExecutionResult,
    target: &PodRef,
    window: usize,
) -> std::result::Result<SubQueryData, String> {
    let parsed = match query {
        SubQuery::Status => parser::parse_pod(&result.stdout).map(SubQueryData::Status),
        SubQuery::Events => parser::parse_events(&result.stdout, window).map(|events| {
            SubQueryData::Events(PodObservation {
                name: target.name.clone(),
                namespace: target.namespace.clone(),
                events,
                ..Default::default()
            })
        }),
        SubQuery::Logs => Ok(SubQueryData::Logs(result.stdout.clone())),
    };
    parsed.map_err(|e: GatewayError| e.to_string())
}
