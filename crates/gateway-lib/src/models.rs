//! Core data models for the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of recent events kept on a pod observation
pub const DEFAULT_EVENT_WINDOW: usize = 50;

/// Connection parameters for one target cluster
///
/// Supplied by a [`crate::ContextResolver`] and immutable for the lifetime
/// of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterContext {
    pub name: String,
    /// Kubeconfig file holding the credentials for this context
    pub credential_ref: Option<PathBuf>,
    pub api_endpoint: Option<String>,
}

impl ClusterContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential_ref: None,
            api_endpoint: None,
        }
    }

    pub fn with_credentials(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.credential_ref = Some(kubeconfig.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }
}

/// A single requested CLI operation
///
/// Built once through the consuming builder methods and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Operation verb, possibly compound (`rollout restart`)
    pub verb: String,
    pub resource: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub context: ClusterContext,
}

impl CommandSpec {
    pub fn new(verb: impl Into<String>, context: ClusterContext) -> Self {
        Self {
            verb: verb.into(),
            resource: None,
            name: None,
            namespace: None,
            args: Vec::new(),
            context,
        }
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Normalized primary verb: first token, trimmed and lowercased
    pub fn primary_verb(&self) -> String {
        self.verb
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Argument vector passed to the CLI, excluding the binary itself
    ///
    /// The namespace flag goes right after the verb, resource and name, so
    /// it never lands behind a `--` separator, and is only added when the
    /// arguments do not already carry one.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["--context".to_string(), self.context.name.clone()];
        argv.extend(self.verb.split_whitespace().map(str::to_string));
        argv.extend(self.resource.iter().cloned());
        argv.extend(self.name.iter().cloned());

        let mut own_args = self.args.iter().take_while(|a| a.as_str() != "--");
        let has_namespace_flag = own_args.any(|a| {
            a == "-n"
                || a == "--namespace"
                || a.starts_with("--namespace=")
                || a == "-A"
                || a == "--all-namespaces"
        });
        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            if !has_namespace_flag {
                argv.push("-n".to_string());
                argv.push(ns.to_string());
            }
        }

        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Human-readable command line for logging
    pub fn display(&self) -> String {
        format!("kubectl {}", self.to_argv().join(" "))
    }
}

/// Evidence record of one CLI invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub spec: CommandSpec,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Target of a troubleshooting request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
}

impl PodRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Observed status of a single container
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerObservation {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    pub waiting_reason: Option<String>,
    pub terminated_reason: Option<String>,
    pub terminated_exit_code: Option<i32>,
    pub last_termination_reason: Option<String>,
    pub last_termination_exit_code: Option<i32>,
}

/// Pod condition as reported by the API server
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConditionObservation {
    pub condition_type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// A recent event involving the pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventObservation {
    pub reason: String,
    pub message: String,
    pub event_type: String,
    pub count: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything known about one pod, merged from one or more CLI results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodObservation {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// Kinds of the pod's owner references, e.g. `Job`
    #[serde(default)]
    pub owner_kinds: Vec<String>,
    #[serde(default)]
    pub containers: Vec<ContainerObservation>,
    #[serde(default)]
    pub conditions: Vec<PodConditionObservation>,
    /// Most recent first, capped to the configured window
    #[serde(default)]
    pub events: Vec<EventObservation>,
}

impl PodObservation {
    /// Merge two partial observations of the same pod.
    ///
    /// Structured fields prefer the non-empty side; conflicting values resolve
    /// to the greater one so the result does not depend on argument order.
    /// Events are concatenated, sorted most-recent-first and capped.
    pub fn merge(self, other: PodObservation, event_window: usize) -> PodObservation {
        let mut containers = self.containers;
        for theirs in other.containers {
            match containers.iter_mut().find(|c| c.name == theirs.name) {
                Some(ours) => {
                    if theirs > *ours {
                        *ours = theirs;
                    }
                }
                None => containers.push(theirs),
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        let mut conditions = self.conditions;
        for theirs in other.conditions {
            match conditions
                .iter_mut()
                .find(|c| c.condition_type == theirs.condition_type)
            {
                Some(ours) => {
                    if theirs > *ours {
                        *ours = theirs;
                    }
                }
                None => conditions.push(theirs),
            }
        }
        conditions.sort_by(|a, b| a.condition_type.cmp(&b.condition_type));

        let mut owner_kinds = self.owner_kinds;
        owner_kinds.extend(other.owner_kinds);
        owner_kinds.sort();
        owner_kinds.dedup();

        let mut events = self.events;
        events.extend(other.events);
        sort_events(&mut events);
        events.dedup();
        events.truncate(event_window);

        PodObservation {
            name: pick(self.name, other.name),
            namespace: pick(self.namespace, other.namespace),
            phase: pick(self.phase, other.phase),
            owner_kinds,
            containers,
            conditions,
            events,
        }
    }
}

fn pick(a: String, b: String) -> String {
    if a.is_empty() {
        b
    } else if b.is_empty() {
        a
    } else {
        a.max(b)
    }
}

/// Sort events most-recent-first; undated events go last, ties break on content
pub fn sort_events(events: &mut [EventObservation]) {
    events.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.reason.cmp(&b.reason))
            .then_with(|| a.message.cmp(&b.message))
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.event_type.cmp(&b.event_type))
    });
}

/// Classification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    #[serde(rename = "OOMKilled")]
    OomKilled,
    CrashLoop,
    ImagePullError,
    PendingUnschedulable,
    ProbeFailure,
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCategory::OomKilled => write!(f, "OOMKilled"),
            FailureCategory::CrashLoop => write!(f, "CrashLoop"),
            FailureCategory::ImagePullError => write!(f, "ImagePullError"),
            FailureCategory::PendingUnschedulable => write!(f, "PendingUnschedulable"),
            FailureCategory::ProbeFailure => write!(f, "ProbeFailure"),
            FailureCategory::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Reference to the observation field that triggered or corroborates a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Path into the observation, e.g. `containers[app].waiting_reason`
    pub field: String,
    pub value: String,
}

impl Evidence {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Ranked diagnosis for a pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub category: FailureCategory,
    pub cause: String,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub remediation: String,
}

impl FailureClassification {
    /// Zero-confidence verdict used when no rule matches or no status exists
    pub fn unknown(cause: impl Into<String>) -> Self {
        Self {
            category: FailureCategory::Unknown,
            cause: cause.into(),
            confidence: 0.0,
            evidence: Vec::new(),
            remediation: "Inspect the pod description and logs manually.".to_string(),
        }
    }
}

/// Value of the node Ready condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyCondition {
    True,
    False,
    #[default]
    Unknown,
}

/// A node taint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: Option<String>,
    pub effect: String,
}

impl std::fmt::Display for Taint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}:{}", self.key, v, self.effect),
            None => write!(f, "{}:{}", self.key, self.effect),
        }
    }
}

/// Resource usage and conditions of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeObservation {
    pub name: String,
    pub allocatable_memory_bytes: u64,
    /// `None` when usage metrics are unavailable
    pub used_memory_bytes: Option<u64>,
    #[serde(default)]
    pub ready: ReadyCondition,
    /// Pressure-type conditions currently `True`
    #[serde(default)]
    pub pressure_conditions: Vec<String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

/// Node health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Healthy => write!(f, "Healthy"),
            NodeStatus::Warning => write!(f, "Warning"),
            NodeStatus::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node: String,
    pub status: NodeStatus,
    pub utilization_percent: f64,
    pub reasons: Vec<String>,
}

/// Result of one troubleshooting sub-query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCallOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl SubCallOutcome {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Ok,
        }
    }

    pub fn degraded(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
    Partial,
}

/// Composite diagnosis returned by the troubleshooting orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub request_id: uuid::Uuid,
    pub target: PodRef,
    pub context: String,
    pub observation: Option<PodObservation>,
    pub classification: Option<FailureClassification>,
    /// Tail of the pod's container logs, when the logs sub-query succeeded
    pub log_tail: Option<String>,
    pub sub_calls: Vec<SubCallOutcome>,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosticReport {
    pub fn degraded_calls(&self) -> impl Iterator<Item = &SubCallOutcome> {
        self.sub_calls.iter().filter(|c| !c.is_ok())
    }
}

/// A pod flagged by the failing-pods scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingPod {
    pub pod: PodRef,
    pub phase: String,
    pub classification: FailureClassification,
    /// Status signals that flagged the pod, most specific first
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> ClusterContext {
        ClusterContext::new("prod")
    }

    fn event(reason: &str, minute: u32) -> EventObservation {
        EventObservation {
            reason: reason.to_string(),
            message: format!("{} happened", reason),
            event_type: "Warning".to_string(),
            count: 1,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
        }
    }

    #[test]
    fn test_argv_places_namespace_before_args() {
        let spec = CommandSpec::new("get", ctx())
            .resource("pods")
            .namespace("default")
            .args(["-o", "wide"]);

        assert_eq!(
            spec.to_argv(),
            vec!["--context", "prod", "get", "pods", "-n", "default", "-o", "wide"]
        );
    }

    #[test]
    fn test_argv_namespace_stays_outside_remote_command() {
        let spec = CommandSpec::new("exec", ctx())
            .name("web")
            .namespace("shop")
            .args(["--", "ls", "-n", "1"]);

        assert_eq!(
            spec.to_argv(),
            vec!["--context", "prod", "exec", "web", "-n", "shop", "--", "ls", "-n", "1"]
        );
    }

    #[test]
    fn test_argv_keeps_existing_namespace_flag() {
        let spec = CommandSpec::new("get", ctx())
            .resource("pods")
            .namespace("default")
            .args(["--namespace", "kube-system"]);

        let argv = spec.to_argv();
        assert_eq!(argv.iter().filter(|a| a.as_str() == "-n").count(), 0);
        assert!(argv.ends_with(&["--namespace".to_string(), "kube-system".to_string()]));
    }

    #[test]
    fn test_argv_splits_compound_verb() {
        let spec = CommandSpec::new("rollout restart", ctx())
            .resource("deployment")
            .name("web");
        assert_eq!(
            spec.to_argv(),
            vec!["--context", "prod", "rollout", "restart", "deployment", "web"]
        );
        assert_eq!(spec.primary_verb(), "rollout");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let status = PodObservation {
            name: "web".to_string(),
            namespace: "default".to_string(),
            phase: "Running".to_string(),
            containers: vec![ContainerObservation {
                name: "app".to_string(),
                restart_count: 2,
                ..Default::default()
            }],
            events: vec![event("Pulled", 1)],
            ..Default::default()
        };
        let events = PodObservation {
            events: vec![event("BackOff", 5), event("Started", 3)],
            ..Default::default()
        };

        let a = status.clone().merge(events.clone(), 50);
        let b = events.merge(status, 50);

        assert_eq!(a, b);
        let reasons: Vec<_> = a.events.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["BackOff", "Started", "Pulled"]);
        assert_eq!(a.phase, "Running");
    }

    #[test]
    fn test_merge_caps_event_window() {
        let a = PodObservation {
            events: (0..30).map(|m| event("A", m)).collect(),
            ..Default::default()
        };
        let b = PodObservation {
            events: (30..59).map(|m| event("B", m)).collect(),
            ..Default::default()
        };

        let merged = a.merge(b, 10);
        assert_eq!(merged.events.len(), 10);
        assert_eq!(merged.events[0].reason, "B");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SubCallOutcome::degraded("logs", "timed out after 5s");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["name"], "logs");
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "timed out after 5s");
    }
}
