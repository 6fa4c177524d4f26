//! Observability infrastructure for the gateway
//!
//! Provides:
//! - Prometheus metrics (command outcomes by verb, command latency, report status)
//! - Structured audit logging with tracing

use crate::error::GatewayError;
use crate::models::{CommandSpec, DiagnosticReport, ReportStatus};
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for CLI latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GatewayMetricsInner> = OnceLock::new();

struct GatewayMetricsInner {
    command_latency_seconds: HistogramVec,
    commands_executed: IntCounterVec,
    commands_blocked: IntCounterVec,
    commands_failed: IntCounterVec,
    reports_generated: IntCounterVec,
    degraded_sub_calls: IntCounterVec,
}

impl GatewayMetricsInner {
    fn new() -> Self {
        Self {
            command_latency_seconds: register_histogram_vec!(
                "kube_gateway_command_latency_seconds",
                "Wall-clock duration of CLI invocations",
                &["verb"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register command_latency_seconds"),

            commands_executed: register_int_counter_vec!(
                "kube_gateway_commands_executed_total",
                "Commands that ran and exited successfully",
                &["verb"]
            )
            .expect("Failed to register commands_executed"),

            commands_blocked: register_int_counter_vec!(
                "kube_gateway_commands_blocked_total",
                "Commands rejected by the safety policy",
                &["verb"]
            )
            .expect("Failed to register commands_blocked"),

            commands_failed: register_int_counter_vec!(
                "kube_gateway_commands_failed_total",
                "Commands that exited non-zero or timed out",
                &["verb"]
            )
            .expect("Failed to register commands_failed"),

            reports_generated: register_int_counter_vec!(
                "kube_gateway_reports_generated_total",
                "Diagnostic reports by completeness",
                &["status"]
            )
            .expect("Failed to register reports_generated"),

            degraded_sub_calls: register_int_counter_vec!(
                "kube_gateway_degraded_sub_calls_total",
                "Troubleshooting sub-queries recorded as degraded",
                &["sub_call"]
            )
            .expect("Failed to register degraded_sub_calls"),
        }
    }
}

/// Gateway metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct GatewayMetrics {
    _private: (),
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GatewayMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GatewayMetricsInner {
        GLOBAL_METRICS.get_or_init(GatewayMetricsInner::new)
    }

    pub fn observe_command_latency(&self, verb: &str, duration_secs: f64) {
        self.inner()
            .command_latency_seconds
            .with_label_values(&[verb])
            .observe(duration_secs);
    }

    pub fn inc_commands_executed(&self, verb: &str) {
        self.inner().commands_executed.with_label_values(&[verb]).inc();
    }

    pub fn inc_commands_blocked(&self, verb: &str) {
        self.inner().commands_blocked.with_label_values(&[verb]).inc();
    }

    pub fn inc_commands_failed(&self, verb: &str) {
        self.inner().commands_failed.with_label_values(&[verb]).inc();
    }

    pub fn inc_report(&self, status: ReportStatus) {
        let label = match status {
            ReportStatus::Complete => "complete",
            ReportStatus::Partial => "partial",
        };
        self.inner().reports_generated.with_label_values(&[label]).inc();
    }

    pub fn inc_degraded_sub_call(&self, name: &str) {
        self.inner().degraded_sub_calls.with_label_values(&[name]).inc();
    }
}

/// Structured audit logger for gateway decisions
///
/// Every executed, failed or blocked command produces one event carrying the
/// full command line, the target context and the requesting identity.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    instance: String,
    requested_by: Option<String>,
}

impl AuditLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            requested_by: None,
        }
    }

    /// Logger attributing events to a requesting user
    pub fn for_requester(&self, requested_by: Option<&str>) -> Self {
        Self {
            instance: self.instance.clone(),
            requested_by: requested_by.map(str::to_string),
        }
    }

    fn requester(&self) -> &str {
        self.requested_by.as_deref().unwrap_or("anonymous")
    }

    pub fn log_executed(&self, spec: &CommandSpec, duration: Duration) {
        info!(
            event = "command_executed",
            instance = %self.instance,
            requested_by = %self.requester(),
            context = %spec.context.name,
            command = %spec.display(),
            duration_ms = duration.as_millis() as u64,
            "Command executed"
        );
    }

    pub fn log_blocked(&self, spec: &CommandSpec, verb: &str, reason: &str) {
        warn!(
            event = "command_blocked",
            instance = %self.instance,
            requested_by = %self.requester(),
            context = %spec.context.name,
            command = %spec.display(),
            verb = %verb,
            reason = %reason,
            "BLOCKED command rejected by safety policy"
        );
    }

    pub fn log_failed(&self, spec: &CommandSpec, error: &GatewayError) {
        warn!(
            event = "command_failed",
            instance = %self.instance,
            requested_by = %self.requester(),
            context = %spec.context.name,
            command = %spec.display(),
            error = %error,
            "Command failed"
        );
    }

    pub fn log_report(&self, report: &DiagnosticReport) {
        let degraded: Vec<&str> = report.degraded_calls().map(|c| c.name.as_str()).collect();
        info!(
            event = "troubleshoot_completed",
            instance = %self.instance,
            requested_by = %self.requester(),
            request_id = %report.request_id,
            pod = %report.target,
            context = %report.context,
            status = ?report.status,
            category = ?report.classification.as_ref().map(|c| c.category),
            degraded = ?degraded,
            "Diagnostic report generated"
        );
    }

    pub fn log_startup(&self, version: &str, read_only: bool) {
        info!(
            event = "gateway_started",
            instance = %self.instance,
            version = %version,
            read_only = read_only,
            "Kube gateway started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "gateway_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Kube gateway shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_metrics_creation() {
        let metrics = GatewayMetrics::new();

        metrics.observe_command_latency("get", 0.2);
        metrics.inc_commands_executed("get");
        metrics.inc_commands_blocked("delete");
        metrics.inc_commands_failed("logs");
        metrics.inc_report(ReportStatus::Partial);
        metrics.inc_degraded_sub_call("logs");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "kube_gateway_commands_blocked_total"));
    }

    #[test]
    fn test_audit_logger_requester() {
        let logger = AuditLogger::new("test");
        assert_eq!(logger.requester(), "anonymous");

        let scoped = logger.for_requester(Some("U123"));
        assert_eq!(scoped.requester(), "U123");
        assert_eq!(scoped.instance, "test");
    }
}
