//! Parsers for the cluster CLI's output
//!
//! Machine-readable output (`-o json`) is decoded through lenient wire
//! structs: every field defaults when missing and field order never matters.
//! The only text format handled is `kubectl top nodes --no-headers`.

use crate::error::{GatewayError, Result};
use crate::models::{
    sort_events, ContainerObservation, EventObservation, NodeObservation, PodConditionObservation,
    PodObservation, ReadyCondition, Taint,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Node condition types that report resource pressure
const PRESSURE_CONDITIONS: &[&str] = &[
    "MemoryPressure",
    "DiskPressure",
    "PIDPressure",
    "NetworkUnavailable",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemList<T> {
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    namespace: String,
    creation_timestamp: Option<DateTime<Utc>>,
    owner_references: Vec<OwnerReferenceWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwnerReferenceWire {
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodWire {
    metadata: ObjectMeta,
    status: PodStatusWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodStatusWire {
    phase: String,
    conditions: Vec<ConditionWire>,
    container_statuses: Vec<ContainerStatusWire>,
    init_container_statuses: Vec<ContainerStatusWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionWire {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContainerStatusWire {
    name: String,
    ready: bool,
    restart_count: u32,
    state: ContainerStateWire,
    last_state: ContainerStateWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerStateWire {
    waiting: Option<StateDetailWire>,
    terminated: Option<StateDetailWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StateDetailWire {
    reason: Option<String>,
    exit_code: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EventWire {
    metadata: ObjectMeta,
    reason: String,
    message: String,
    #[serde(rename = "type")]
    event_type: String,
    count: Option<u32>,
    last_timestamp: Option<DateTime<Utc>>,
    event_time: Option<DateTime<Utc>>,
    first_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeWire {
    metadata: ObjectMeta,
    spec: NodeSpecWire,
    status: NodeStatusWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeSpecWire {
    taints: Vec<TaintWire>,
    unschedulable: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaintWire {
    key: String,
    value: Option<String>,
    effect: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeStatusWire {
    allocatable: BTreeMap<String, String>,
    capacity: BTreeMap<String, String>,
    conditions: Vec<ConditionWire>,
}

impl From<ContainerStatusWire> for ContainerObservation {
    fn from(wire: ContainerStatusWire) -> Self {
        let waiting_reason = wire.state.waiting.and_then(|w| w.reason);
        let (terminated_reason, terminated_exit_code) = wire
            .state
            .terminated
            .map(|t| (t.reason, t.exit_code))
            .unwrap_or_default();
        let (last_termination_reason, last_termination_exit_code) = wire
            .last_state
            .terminated
            .map(|t| (t.reason, t.exit_code))
            .unwrap_or_default();

        ContainerObservation {
            name: wire.name,
            ready: wire.ready,
            restart_count: wire.restart_count,
            waiting_reason,
            terminated_reason,
            terminated_exit_code,
            last_termination_reason,
            last_termination_exit_code,
        }
    }
}

impl From<PodWire> for PodObservation {
    fn from(wire: PodWire) -> Self {
        let containers = wire
            .status
            .init_container_statuses
            .into_iter()
            .chain(wire.status.container_statuses)
            .map(ContainerObservation::from)
            .collect();

        let conditions = wire
            .status
            .conditions
            .into_iter()
            .map(|c| PodConditionObservation {
                condition_type: c.condition_type,
                status: c.status,
                reason: c.reason,
                message: c.message,
            })
            .collect();

        PodObservation {
            name: wire.metadata.name,
            namespace: wire.metadata.namespace,
            phase: wire.status.phase,
            owner_kinds: wire
                .metadata
                .owner_references
                .into_iter()
                .map(|r| r.kind)
                .filter(|kind| !kind.is_empty())
                .collect(),
            containers,
            conditions,
            events: Vec::new(),
        }
    }
}

impl From<EventWire> for EventObservation {
    fn from(wire: EventWire) -> Self {
        let timestamp = wire
            .last_timestamp
            .or(wire.event_time)
            .or(wire.first_timestamp)
            .or(wire.metadata.creation_timestamp);

        EventObservation {
            reason: wire.reason,
            message: wire.message,
            event_type: wire.event_type,
            count: wire.count.unwrap_or(1),
            timestamp,
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(what: &str, stdout: &'a str) -> Result<T> {
    serde_json::from_str(stdout)
        .map_err(|e| GatewayError::Parse(format!("invalid {} JSON: {}", what, e)))
}

/// Parse `kubectl get pod <name> -o json`
pub fn parse_pod(stdout: &str) -> Result<PodObservation> {
    let wire: PodWire = decode("pod", stdout)?;
    Ok(wire.into())
}

/// Parse `kubectl get pods -o json`
pub fn parse_pod_list(stdout: &str) -> Result<Vec<PodObservation>> {
    let list: ItemList<PodWire> = decode("pod list", stdout)?;
    Ok(list.items.into_iter().map(PodObservation::from).collect())
}

/// Parse `kubectl get events -o json`, most recent first, capped to `window`
pub fn parse_events(stdout: &str, window: usize) -> Result<Vec<EventObservation>> {
    let list: ItemList<EventWire> = decode("event list", stdout)?;
    let mut events: Vec<EventObservation> =
        list.items.into_iter().map(EventObservation::from).collect();
    sort_events(&mut events);
    events.truncate(window);
    Ok(events)
}

/// Parse `kubectl get nodes -o json` into observations without usage data
pub fn parse_nodes(stdout: &str) -> Result<Vec<NodeObservation>> {
    let list: ItemList<NodeWire> = decode("node list", stdout)?;
    Ok(list.items.into_iter().map(node_observation).collect())
}

fn node_observation(wire: NodeWire) -> NodeObservation {
    let memory = wire
        .status
        .allocatable
        .get("memory")
        .or_else(|| wire.status.capacity.get("memory"));
    let allocatable_memory_bytes = match memory {
        Some(q) => parse_quantity(q).unwrap_or_else(|| {
            warn!(node = %wire.metadata.name, quantity = %q, "Unparseable memory quantity");
            0
        }),
        None => 0,
    };

    let ready = match wire
        .status
        .conditions
        .iter()
        .find(|c| c.condition_type == "Ready")
        .map(|c| c.status.as_str())
    {
        Some("True") => ReadyCondition::True,
        Some("False") => ReadyCondition::False,
        _ => ReadyCondition::Unknown,
    };

    let pressure_conditions = wire
        .status
        .conditions
        .iter()
        .filter(|c| PRESSURE_CONDITIONS.contains(&c.condition_type.as_str()) && c.status == "True")
        .map(|c| c.condition_type.clone())
        .collect();

    let mut taints: Vec<Taint> = wire
        .spec
        .taints
        .into_iter()
        .map(|t| Taint {
            key: t.key,
            value: t.value,
            effect: t.effect,
        })
        .collect();
    if wire.spec.unschedulable && !taints.iter().any(|t| t.key == "node.kubernetes.io/unschedulable") {
        taints.push(Taint {
            key: "node.kubernetes.io/unschedulable".to_string(),
            value: None,
            effect: "NoSchedule".to_string(),
        });
    }

    NodeObservation {
        name: wire.metadata.name,
        allocatable_memory_bytes,
        used_memory_bytes: None,
        ready,
        pressure_conditions,
        taints,
    }
}

/// Parse `kubectl top nodes --no-headers` into node name -> used memory bytes
///
/// Malformed lines are skipped.
pub fn parse_top_nodes(stdout: &str) -> HashMap<String, u64> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            match parse_quantity(parts[3]) {
                Some(bytes) => Some((parts[0].to_string(), bytes)),
                None => {
                    warn!(node = %parts[0], value = %parts[3], "Could not parse memory usage");
                    None
                }
            }
        })
        .collect()
}

/// Parse a Kubernetes resource quantity into bytes
///
/// Supports binary (`Ki`..`Ei`) and decimal (`k`..`E`) suffixes, milli
/// (`m`), plain and exponent forms.
pub fn parse_quantity(quantity: &str) -> Option<u64> {
    let q = quantity.trim();
    if q.is_empty() {
        return None;
    }

    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("k", 1e3),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
        ("m", 1e-3),
    ];

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| q.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((q, 1.0));

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}
