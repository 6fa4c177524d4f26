//! Node health evaluation
//!
//! A pure function of one [`NodeObservation`] and a memory threshold. A node
//! is only reported `Healthy` when it is explicitly Ready and its measured
//! utilization is below the threshold.

use crate::models::{NodeHealth, NodeObservation, NodeStatus, ReadyCondition};

/// Default memory utilization threshold (percent)
pub const DEFAULT_MEMORY_THRESHOLD_PERCENT: f64 = 80.0;

/// Evaluate a node against a memory utilization threshold
pub fn evaluate(obs: &NodeObservation, threshold_percent: f64) -> NodeHealth {
    let mut reasons = Vec::new();
    let mut status = NodeStatus::Healthy;

    let utilization = match (obs.used_memory_bytes, obs.allocatable_memory_bytes) {
        (None, _) => {
            reasons.push("Memory usage not reported (metrics unavailable)".to_string());
            status = NodeStatus::Warning;
            0.0
        }
        (Some(_), 0) => {
            reasons.push("Allocatable memory is zero or unknown".to_string());
            status = NodeStatus::Warning;
            0.0
        }
        (Some(used), allocatable) => {
            let percent = (used as f64 / allocatable as f64 * 100.0).clamp(0.0, 100.0);
            if percent >= threshold_percent {
                reasons.push(format!(
                    "Memory utilization {:.1}% is at or above threshold {:.1}%",
                    percent, threshold_percent
                ));
                status = NodeStatus::Warning;
            }
            percent
        }
    };

    match obs.ready {
        ReadyCondition::True => {}
        ReadyCondition::False => {
            reasons.insert(0, "Node is not Ready".to_string());
            status = NodeStatus::Critical;
        }
        ReadyCondition::Unknown => {
            reasons.insert(0, "Node Ready condition is Unknown".to_string());
            status = status.max(NodeStatus::Warning);
        }
    }

    reasons.extend(
        obs.pressure_conditions
            .iter()
            .map(|c| format!("{} condition is active", c)),
    );
    reasons.extend(obs.taints.iter().map(|t| format!("Tainted {}", t)));

    NodeHealth {
        node: obs.name.clone(),
        status,
        utilization_percent: utilization,
        reasons,
    }
}
