//! Policy-checked command execution
//!
//! The gateway is the only path from a request to the cluster CLI. Every
//! command is checked against the [`SafetyPolicy`] before a process is
//! spawned, then executed as an argument vector (never through a shell)
//! under a timeout. There are no retries here; callers own retry policy.

use crate::error::{GatewayError, Result};
use crate::models::{ClusterContext, CommandSpec, ExecutionResult};
use crate::observability::{AuditLogger, GatewayMetrics};
use crate::policy::SafetyPolicy;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Raw output of one CLI process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Capability to invoke the cluster CLI
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the CLI once with `argv`, bounded by `timeout`
    async fn invoke(
        &self,
        argv: &[String],
        context: &ClusterContext,
        timeout: Duration,
    ) -> Result<RawOutput>;
}

/// Runs the real `kubectl` binary
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    binary: PathBuf,
}

impl Default for KubectlRunner {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Verify the binary exists by asking for its client version
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(["version", "--client"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(GatewayError::Execution {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl CommandRunner for KubectlRunner {
    async fn invoke(
        &self,
        argv: &[String],
        context: &ClusterContext,
        timeout: Duration,
    ) -> Result<RawOutput> {
        let mut command = Command::new(&self.binary);
        command
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(kubeconfig) = &context.credential_ref {
            command.env("KUBECONFIG", kubeconfig);
        }

        // Dropping the output future on timeout kills the child.
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| GatewayError::timeout(timeout))??;

        Ok(RawOutput {
            // Signal-terminated processes have no exit code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Safe command-execution gateway
pub struct CommandGateway {
    policy: Arc<SafetyPolicy>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    /// Serializes mutating commands: one command, one invocation
    mutation_lock: Mutex<()>,
    metrics: GatewayMetrics,
    audit: AuditLogger,
}

impl CommandGateway {
    pub fn new(policy: Arc<SafetyPolicy>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            policy,
            runner,
            timeout,
            mutation_lock: Mutex::new(()),
            metrics: GatewayMetrics::new(),
            audit: AuditLogger::new("kube-gateway"),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute with the gateway's default timeout
    pub async fn execute(&self, spec: CommandSpec) -> Result<ExecutionResult> {
        self.run(spec, self.timeout, None).await
    }

    /// Execute on behalf of a named requester, recorded in the audit trail
    pub async fn execute_as(
        &self,
        spec: CommandSpec,
        requested_by: Option<&str>,
    ) -> Result<ExecutionResult> {
        self.run(spec, self.timeout, requested_by).await
    }

    /// Execute with an explicit timeout, e.g. a troubleshooting sub-query
    pub async fn execute_with_timeout(
        &self,
        spec: CommandSpec,
        timeout: Duration,
        requested_by: Option<&str>,
    ) -> Result<ExecutionResult> {
        self.run(spec, timeout, requested_by).await
    }

    /// Validate `spec`, then invoke the CLI exactly once
    async fn run(
        &self,
        spec: CommandSpec,
        timeout: Duration,
        requested_by: Option<&str>,
    ) -> Result<ExecutionResult> {
        let verb = spec.primary_verb();
        let audit = match requested_by {
            Some(_) => self.audit.for_requester(requested_by),
            None => self.audit.clone(),
        };

        if let Err(e) = self.policy.check(&spec) {
            if let GatewayError::PolicyViolation { verb, reason } = &e {
                self.metrics
                    .inc_commands_blocked(&self.policy.rejection_label(verb));
                audit.log_blocked(&spec, verb, reason);
            }
            return Err(e);
        }

        // Label values come from the policy's fixed verb sets only.
        let label = self.policy.verb_label(&verb);

        let _guard = if self.policy.is_read_only_verb(&verb) {
            None
        } else {
            Some(self.mutation_lock.lock().await)
        };

        let argv = spec.to_argv();
        debug!(command = %spec.display(), context = %spec.context.name, "Invoking CLI");

        let start = Instant::now();
        let outcome = self.runner.invoke(&argv, &spec.context, timeout).await;
        let duration = start.elapsed();
        self.metrics
            .observe_command_latency(&label, duration.as_secs_f64());

        let raw = match outcome {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.inc_commands_failed(&label);
                audit.log_failed(&spec, &e);
                return Err(e);
            }
        };

        if raw.exit_code != 0 {
            let err = GatewayError::Execution {
                exit_code: Some(raw.exit_code),
                stderr: raw.stderr,
                timed_out: false,
            };
            self.metrics.inc_commands_failed(&label);
            audit.log_failed(&spec, &err);
            return Err(err);
        }

        self.metrics.inc_commands_executed(&label);
        audit.log_executed(&spec, duration);

        Ok(ExecutionResult {
            exit_code: raw.exit_code,
            stdout: raw.stdout,
            stderr: raw.stderr,
            duration,
            spec,
        })
    }
}
