//! Error types for gateway operations

use thiserror::Error;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the command gateway and its collaborators.
///
/// The classifier and node evaluator never produce these; they degrade to
/// their most conservative verdict instead.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A requested verb is blocked by the safety policy. Raised before any
    /// process is spawned and never retried.
    #[error("Policy violation: '{verb}' is not permitted ({reason})")]
    PolicyViolation { verb: String, reason: String },

    /// The CLI exited non-zero or exceeded its timeout.
    #[error("Command failed (exit code {}): {stderr}", display_exit_code(.exit_code))]
    Execution {
        exit_code: Option<i32>,
        stderr: String,
        timed_out: bool,
    },

    /// A context, pod or node could not be resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// CLI output could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error while spawning the CLI.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The kubeconfig could not be read or is malformed.
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl GatewayError {
    pub fn policy(verb: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            verb: verb.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Execution {
            exit_code: None,
            stderr: format!("timed out after {}s", after.as_secs_f64()),
            timed_out: true,
        }
    }

    /// Short reason suitable for a degraded sub-call outcome.
    pub fn degraded_reason(&self) -> String {
        match self {
            GatewayError::Execution {
                timed_out: true,
                stderr,
                ..
            } => stderr.clone(),
            GatewayError::Execution {
                exit_code, stderr, ..
            } => {
                let stderr = stderr.trim();
                match exit_code {
                    Some(code) => format!("exit code {}: {}", code, stderr),
                    None => stderr.to_string(),
                }
            }
            other => other.to_string(),
        }
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, GatewayError::PolicyViolation { .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Parse(err.to_string())
    }
}
