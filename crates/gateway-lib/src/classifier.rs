//! Pod failure classification
//!
//! A fixed, ordered rule table is evaluated top to bottom against a
//! [`PodObservation`]; the first rule whose matcher returns evidence wins.
//! Classification never fails: when nothing matches the verdict is
//! [`FailureCategory::Unknown`] with zero confidence.

use crate::models::{
    Evidence, FailureCategory, FailureClassification, PodObservation, DEFAULT_EVENT_WINDOW,
};
use serde::{Deserialize, Serialize};

/// Restart count at which restarts corroborate a CrashLoop verdict
pub const DEFAULT_CRASHLOOP_RESTART_THRESHOLD: u32 = 3;

const IMAGE_PULL_REASONS: &[&str] = &["ImagePullBackOff", "ErrImagePull"];

/// Scheduler messages meaning no node can take the pod
const UNSCHEDULABLE_MARKERS: &[&str] = &[
    "insufficient",
    "didn't match",
    "did not match",
    "no nodes available",
    "nodes are available",
    "untolerated taint",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Restarts needed before they are cited as CrashLoop corroboration
    pub crashloop_restart_threshold: u32,
    /// Number of most recent events inspected
    pub event_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            crashloop_restart_threshold: DEFAULT_CRASHLOOP_RESTART_THRESHOLD,
            event_window: DEFAULT_EVENT_WINDOW,
        }
    }
}

type Matcher = fn(&PodObservation, &ClassifierConfig) -> Option<Match>;

/// Evidence produced by a matching rule
struct Match {
    cause: String,
    evidence: Vec<Evidence>,
}

struct Rule {
    category: FailureCategory,
    confidence: f64,
    matcher: Matcher,
    remediation: &'static str,
}

/// Ordered most severe / most specific first
const RULES: &[Rule] = &[
    Rule {
        category: FailureCategory::OomKilled,
        confidence: 0.95,
        matcher: match_oom_killed,
        remediation: "Raise the container memory limit or reduce the workload's memory use; \
                      check for leaks if usage grows steadily.",
    },
    Rule {
        category: FailureCategory::CrashLoop,
        confidence: 0.9,
        matcher: match_crash_loop,
        remediation: "Inspect the previous container logs (kubectl logs --previous) for the \
                      crash cause; verify command, configuration and dependencies.",
    },
    Rule {
        category: FailureCategory::ImagePullError,
        confidence: 0.9,
        matcher: match_image_pull,
        remediation: "Verify the image name and tag exist and that the pod's image pull \
                      secrets grant access to the registry.",
    },
    Rule {
        category: FailureCategory::PendingUnschedulable,
        confidence: 0.85,
        matcher: match_unschedulable,
        remediation: "Lower the pod's resource requests, add node capacity, or relax node \
                      selectors, affinity rules and taint tolerations.",
    },
    Rule {
        category: FailureCategory::ProbeFailure,
        confidence: 0.7,
        matcher: match_probe_failure,
        remediation: "Check the probe endpoint, port and timing; increase initialDelaySeconds \
                      or failureThreshold if the application starts slowly.",
    },
];

/// Rule-based pod failure classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a pod observation. Deterministic; never fails.
    pub fn classify(&self, obs: &PodObservation) -> FailureClassification {
        RULES
            .iter()
            .find_map(|rule| {
                (rule.matcher)(obs, &self.config).map(|m| FailureClassification {
                    category: rule.category,
                    cause: m.cause,
                    confidence: rule.confidence,
                    evidence: m.evidence,
                    remediation: rule.remediation.to_string(),
                })
            })
            .unwrap_or_else(|| {
                FailureClassification::unknown("No known failure signature matched")
            })
    }
}

/// Classify with the default configuration
pub fn classify(obs: &PodObservation) -> FailureClassification {
    Classifier::default().classify(obs)
}

fn container_field(container: &str, field: &str) -> String {
    format!("containers[{}].{}", container, field)
}

fn match_oom_killed(obs: &PodObservation, _: &ClassifierConfig) -> Option<Match> {
    let container = obs
        .containers
        .iter()
        .find(|c| c.last_termination_reason.as_deref() == Some("OOMKilled"))?;

    let mut evidence = vec![Evidence::new(
        container_field(&container.name, "last_termination_reason"),
        "OOMKilled",
    )];
    if let Some(code) = container.last_termination_exit_code {
        evidence.push(Evidence::new(
            container_field(&container.name, "last_termination_exit_code"),
            code.to_string(),
        ));
    }

    Some(Match {
        cause: format!(
            "Container '{}' was killed for exceeding its memory limit",
            container.name
        ),
        evidence,
    })
}

fn match_crash_loop(obs: &PodObservation, config: &ClassifierConfig) -> Option<Match> {
    let container = obs
        .containers
        .iter()
        .find(|c| c.waiting_reason.as_deref() == Some("CrashLoopBackOff"))?;

    let mut evidence = vec![Evidence::new(
        container_field(&container.name, "waiting_reason"),
        "CrashLoopBackOff",
    )];

    // Restarts and back-off events only corroborate; they never trigger.
    if container.restart_count >= config.crashloop_restart_threshold {
        evidence.push(Evidence::new(
            container_field(&container.name, "restart_count"),
            container.restart_count.to_string(),
        ));
    }
    if let Some((idx, event)) = recent_events(obs, config).find(|(_, e)| e.reason == "BackOff") {
        evidence.push(Evidence::new(
            format!("events[{}]", idx),
            format!("{}: {}", event.reason, event.message),
        ));
    }

    Some(Match {
        cause: format!(
            "Container '{}' keeps crashing and is in restart back-off ({} restarts)",
            container.name, container.restart_count
        ),
        evidence,
    })
}

fn match_image_pull(obs: &PodObservation, _: &ClassifierConfig) -> Option<Match> {
    let (container, reason) = obs.containers.iter().find_map(|c| {
        c.waiting_reason
            .as_deref()
            .filter(|r| IMAGE_PULL_REASONS.contains(r))
            .map(|r| (c, r))
    })?;

    Some(Match {
        cause: format!("Container '{}' cannot pull its image ({})", container.name, reason),
        evidence: vec![Evidence::new(
            container_field(&container.name, "waiting_reason"),
            reason,
        )],
    })
}

fn match_unschedulable(obs: &PodObservation, _: &ClassifierConfig) -> Option<Match> {
    if obs.phase != "Pending" {
        return None;
    }

    let (idx, condition) = obs.conditions.iter().enumerate().find(|(_, c)| {
        if c.condition_type != "PodScheduled" || c.status != "False" {
            return false;
        }
        let message = c.message.as_deref().unwrap_or_default().to_lowercase();
        c.reason.as_deref() == Some("Unschedulable")
            || UNSCHEDULABLE_MARKERS.iter().any(|m| message.contains(m))
    })?;

    let mut evidence = vec![
        Evidence::new("phase", "Pending"),
        Evidence::new(
            format!("conditions[{}].reason", idx),
            condition.reason.clone().unwrap_or_default(),
        ),
    ];
    if let Some(message) = &condition.message {
        evidence.push(Evidence::new(format!("conditions[{}].message", idx), message.clone()));
    }

    Some(Match {
        cause: format!(
            "Pod cannot be scheduled: {}",
            condition
                .message
                .as_deref()
                .unwrap_or("no node satisfies its requirements")
        ),
        evidence,
    })
}

fn match_probe_failure(obs: &PodObservation, config: &ClassifierConfig) -> Option<Match> {
    let (idx, event) = recent_events(obs, config).find(|(_, e)| {
        let message = e.message.to_lowercase();
        message.contains("probe failed")
            || (e.reason == "Unhealthy" && message.contains("probe"))
    })?;

    Some(Match {
        cause: format!("Health probe failing: {}", event.message),
        evidence: vec![Evidence::new(
            format!("events[{}]", idx),
            format!("{}: {}", event.reason, event.message),
        )],
    })
}

fn recent_events<'a>(
    obs: &'a PodObservation,
    config: &ClassifierConfig,
) -> impl Iterator<Item = (usize, &'a crate::models::EventObservation)> {
    obs.events.iter().enumerate().take(config.event_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerObservation, EventObservation, PodConditionObservation};

    fn pod(containers: Vec<ContainerObservation>) -> PodObservation {
        PodObservation {
            name: "web-5c9d".to_string(),
            namespace: "default".to_string(),
            phase: "Running".to_string(),
            containers,
            ..Default::default()
        }
    }

    fn container(name: &str) -> ContainerObservation {
        ContainerObservation {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn probe_event() -> EventObservation {
        EventObservation {
            reason: "Unhealthy".to_string(),
            message: "Readiness probe failed: Get \"http://10.0.0.7:8080/ready\": connection refused"
                .to_string(),
            event_type: "Warning".to_string(),
            count: 12,
            timestamp: None,
        }
    }

    #[test]
    fn test_crash_loop_scenario() {
        let obs = pod(vec![ContainerObservation {
            waiting_reason: Some("CrashLoopBackOff".to_string()),
            restart_count: 5,
            ..container("app")
        }]);

        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::CrashLoop);
        assert_eq!(result.confidence, 0.9);
        assert!(result
            .evidence
            .contains(&Evidence::new("containers[app].waiting_reason", "CrashLoopBackOff")));
        assert!(result
            .evidence
            .contains(&Evidence::new("containers[app].restart_count", "5")));
    }

    #[test]
    fn test_restarts_alone_do_not_trigger_crash_loop() {
        let obs = pod(vec![ContainerObservation {
            restart_count: 40,
            ..container("app")
        }]);
        assert_eq!(classify(&obs).category, FailureCategory::Unknown);
    }

    #[test]
    fn test_single_restart_is_not_corroboration() {
        let obs = pod(vec![ContainerObservation {
            waiting_reason: Some("CrashLoopBackOff".to_string()),
            restart_count: 1,
            ..container("app")
        }]);
        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::CrashLoop);
        assert!(!result.evidence.iter().any(|e| e.field.ends_with("restart_count")));
    }

    #[test]
    fn test_oom_takes_precedence_over_image_pull() {
        let obs = pod(vec![
            ContainerObservation {
                waiting_reason: Some("ImagePullBackOff".to_string()),
                ..container("sidecar")
            },
            ContainerObservation {
                last_termination_reason: Some("OOMKilled".to_string()),
                last_termination_exit_code: Some(137),
                ..container("app")
            },
        ]);

        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::OomKilled);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(
            result.evidence[0],
            Evidence::new("containers[app].last_termination_reason", "OOMKilled")
        );
    }

    #[test]
    fn test_image_pull_error() {
        let obs = pod(vec![ContainerObservation {
            waiting_reason: Some("ErrImagePull".to_string()),
            ..container("app")
        }]);
        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::ImagePullError);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_pending_unschedulable() {
        let mut obs = pod(vec![]);
        obs.phase = "Pending".to_string();
        obs.conditions = vec![PodConditionObservation {
            condition_type: "PodScheduled".to_string(),
            status: "False".to_string(),
            reason: Some("Unschedulable".to_string()),
            message: Some("0/3 nodes are available: 3 Insufficient cpu.".to_string()),
        }];

        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::PendingUnschedulable);
        assert_eq!(result.confidence, 0.85);
        assert!(result.evidence.contains(&Evidence::new("conditions[0].reason", "Unschedulable")));
    }

    #[test]
    fn test_running_pod_with_unschedulable_condition_is_not_pending() {
        let mut obs = pod(vec![]);
        obs.conditions = vec![PodConditionObservation {
            condition_type: "PodScheduled".to_string(),
            status: "False".to_string(),
            reason: Some("Unschedulable".to_string()),
            message: None,
        }];
        assert_eq!(classify(&obs).category, FailureCategory::Unknown);
    }

    #[test]
    fn test_probe_failure_from_events() {
        let mut obs = pod(vec![container("app")]);
        obs.events = vec![probe_event()];

        let result = classify(&obs);
        assert_eq!(result.category, FailureCategory::ProbeFailure);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.evidence[0].field, "events[0]");
    }

    #[test]
    fn test_probe_event_outside_window_is_ignored() {
        let mut obs = pod(vec![container("app")]);
        obs.events = vec![EventObservation::default(); 3];
        obs.events.push(probe_event());

        let classifier = Classifier::with_config(ClassifierConfig {
            event_window: 3,
            ..Default::default()
        });
        assert_eq!(classifier.classify(&obs).category, FailureCategory::Unknown);
    }

    #[test]
    fn test_no_signal_yields_unknown() {
        let result = classify(&PodObservation::default());
        assert_eq!(result.category, FailureCategory::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn test_classify_is_deterministic() {
        let mut obs = pod(vec![ContainerObservation {
            waiting_reason: Some("CrashLoopBackOff".to_string()),
            restart_count: 9,
            ..container("app")
        }]);
        obs.events = vec![probe_event()];

        let first = classify(&obs);
        for _ in 0..10 {
            assert_eq!(classify(&obs), first);
        }
    }
}
