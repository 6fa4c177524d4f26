//! Status signals that mark a pod as failing
//!
//! Complements the classifier for the failing-pods scan: the classifier
//! names a root cause, these checks catch pods that are broken without
//! matching a known signature (bad config, non-zero exits, stuck readiness).

use crate::models::{ContainerObservation, PodObservation};

/// Waiting reasons that never resolve on their own
pub const FAILING_WAIT_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "StartError",
    "SetupFailed",
];

/// Restarts above which a not-ready container counts as failing
pub const NOT_READY_RESTART_THRESHOLD: u32 = 3;

/// Terminated reasons that are expected outcomes rather than failures
const BENIGN_TERMINATION_REASONS: &[&str] = &["Completed", "OOMKilled"];

/// Reasons `obs` should be reported as failing; empty when healthy.
///
/// Job pods that succeeded with every container exiting 0 are never
/// reported.
pub fn failure_reasons(obs: &PodObservation) -> Vec<String> {
    if is_completed_job(obs) {
        return Vec::new();
    }

    let mut reasons = Vec::new();
    if matches!(obs.phase.as_str(), "Failed" | "Unknown") {
        reasons.push(format!("Pod phase is '{}'", obs.phase));
    }

    for container in &obs.containers {
        if let Some(reason) = container_failure(container) {
            reasons.push(reason);
        }

        if obs.phase == "Running"
            && !container.ready
            && container.restart_count > NOT_READY_RESTART_THRESHOLD
        {
            reasons.push(format!(
                "Container '{}' is not ready and has restarted {} times",
                container.name, container.restart_count
            ));
        }
    }

    reasons
}

fn container_failure(container: &ContainerObservation) -> Option<String> {
    if let Some(reason) = container
        .waiting_reason
        .as_deref()
        .filter(|r| FAILING_WAIT_REASONS.contains(r))
    {
        return Some(format!("Container '{}' is waiting: {}", container.name, reason));
    }

    match (container.terminated_exit_code, container.terminated_reason.as_deref()) {
        (Some(code), reason) if code != 0 => Some(format!(
            "Container '{}' terminated with exit code {} (reason: {})",
            container.name,
            code,
            reason.unwrap_or("Error")
        )),
        (_, Some(reason)) if !BENIGN_TERMINATION_REASONS.contains(&reason) => Some(format!(
            "Container '{}' terminated with reason: {}",
            container.name, reason
        )),
        _ => None,
    }
}

fn is_completed_job(obs: &PodObservation) -> bool {
    obs.owner_kinds.iter().any(|kind| kind == "Job")
        && matches!(obs.phase.as_str(), "Succeeded" | "Completed")
        && !obs.containers.is_empty()
        && obs
            .containers
            .iter()
            .all(|c| c.terminated_exit_code == Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(phase: &str, containers: Vec<ContainerObservation>) -> PodObservation {
        PodObservation {
            name: "worker".to_string(),
            namespace: "batch".to_string(),
            phase: phase.to_string(),
            containers,
            ..Default::default()
        }
    }

    fn container(name: &str) -> ContainerObservation {
        ContainerObservation {
            name: name.to_string(),
            ready: true,
            ..Default::default()
        }
    }

    fn terminated(name: &str, code: i32, reason: &str) -> ContainerObservation {
        ContainerObservation {
            terminated_exit_code: Some(code),
            terminated_reason: Some(reason.to_string()),
            ready: false,
            ..container(name)
        }
    }

    #[test]
    fn test_config_error_is_failing() {
        for reason in ["CreateContainerConfigError", "StartError", "SetupFailed"] {
            let obs = pod(
                "Pending",
                vec![ContainerObservation {
                    waiting_reason: Some(reason.to_string()),
                    ready: false,
                    ..container("app")
                }],
            );
            let reasons = failure_reasons(&obs);
            assert_eq!(reasons, vec![format!("Container 'app' is waiting: {}", reason)]);
        }
    }

    #[test]
    fn test_startup_waiting_is_not_failing() {
        for reason in ["ContainerCreating", "PodInitializing"] {
            let obs = pod(
                "Pending",
                vec![ContainerObservation {
                    waiting_reason: Some(reason.to_string()),
                    ready: false,
                    ..container("app")
                }],
            );
            assert!(failure_reasons(&obs).is_empty(), "{} flagged", reason);
        }
    }

    #[test]
    fn test_non_zero_exit_is_failing() {
        let obs = pod("Running", vec![terminated("app", 2, "Error"), container("sidecar")]);
        let reasons = failure_reasons(&obs);
        assert_eq!(
            reasons,
            vec!["Container 'app' terminated with exit code 2 (reason: Error)"]
        );
    }

    #[test]
    fn test_unusual_termination_reason_is_failing() {
        let obs = pod("Running", vec![terminated("app", 0, "ContainerCannotRun")]);
        assert_eq!(
            failure_reasons(&obs),
            vec!["Container 'app' terminated with reason: ContainerCannotRun"]
        );
    }

    #[test]
    fn test_not_ready_with_restarts() {
        let flapping = ContainerObservation {
            ready: false,
            restart_count: 7,
            ..container("app")
        };
        let reasons = failure_reasons(&pod("Running", vec![flapping]));
        assert_eq!(reasons, vec!["Container 'app' is not ready and has restarted 7 times"]);

        // At the threshold a not-ready container is still starting up.
        let starting = ContainerObservation {
            ready: false,
            restart_count: NOT_READY_RESTART_THRESHOLD,
            ..container("app")
        };
        assert!(failure_reasons(&pod("Running", vec![starting])).is_empty());
    }

    #[test]
    fn test_failed_phase() {
        let reasons = failure_reasons(&pod("Unknown", vec![]));
        assert_eq!(reasons, vec!["Pod phase is 'Unknown'"]);
    }

    #[test]
    fn test_succeeded_job_is_excluded() {
        let mut obs = pod("Succeeded", vec![terminated("job", 0, "Completed")]);
        obs.owner_kinds = vec!["Job".to_string()];
        assert!(failure_reasons(&obs).is_empty());
    }

    #[test]
    fn test_job_with_failed_container_is_reported() {
        let mut obs = pod(
            "Succeeded",
            vec![terminated("main", 0, "Completed"), terminated("upload", 1, "Error")],
        );
        obs.owner_kinds = vec!["Job".to_string()];

        let reasons = failure_reasons(&obs);
        assert_eq!(
            reasons,
            vec!["Container 'upload' terminated with exit code 1 (reason: Error)"]
        );
    }
}
