//! Safety policy for CLI commands
//!
//! Decides whether a [`CommandSpec`] may reach the cluster. The policy is an
//! immutable value handed to the gateway at construction, so several policies
//! (e.g. per tenant) can coexist.

use crate::error::{GatewayError, Result};
use crate::models::CommandSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Verbs rejected regardless of mode
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "delete", "drain", "cordon", "uncordon", "label", "annotate", "taint", "apply", "patch",
    "replace", "edit", "set",
];

/// Verbs admitted in read-only mode
pub const READ_ONLY_VERBS: &[&str] = &["get", "describe", "logs", "top", "events"];

/// Metric label for verbs on neither the allow-list nor the blocklist
pub const OTHER_VERB_LABEL: &str = "other";

/// Metric label for read-only rejections of verbs outside the allow-list
pub const NOT_ALLOWED_LABEL: &str = "not_allowed";

/// Characters that chain or substitute commands in a shell string
const SHELL_SEPARATORS: &[char] = &[';', '|', '&', '$', '(', ')', '`', '\n'];

/// Sequences that chain commands; rejected outright in read-only mode.
/// Bare parentheses stay legal for set-based label selectors.
const CHAINING_SEQUENCES: &[&str] = &[";", "|", "&", "`", "\n", "$("];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Only the read allow-list may run
    #[default]
    ReadOnly,
    /// Any verb outside the blocklist may run
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyPolicy {
    mode: PolicyMode,
    blocklist: BTreeSet<String>,
    allowlist: BTreeSet<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::read_only()
    }
}

impl SafetyPolicy {
    pub fn new<B, A>(mode: PolicyMode, blocklist: B, allowlist: A) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            mode,
            blocklist: blocklist.into_iter().map(|v| normalize(v.as_ref())).collect(),
            allowlist: allowlist.into_iter().map(|v| normalize(v.as_ref())).collect(),
        }
    }

    pub fn read_only() -> Self {
        Self::new(PolicyMode::ReadOnly, DEFAULT_BLOCKLIST, READ_ONLY_VERBS)
    }

    pub fn read_write() -> Self {
        Self::new(PolicyMode::ReadWrite, DEFAULT_BLOCKLIST, READ_ONLY_VERBS)
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn blocklist(&self) -> impl Iterator<Item = &str> {
        self.blocklist.iter().map(String::as_str)
    }

    /// True when the verb only reads cluster state
    pub fn is_read_only_verb(&self, verb: &str) -> bool {
        self.allowlist.contains(&normalize(verb))
    }

    /// Bounded metric label for a verb: the verb itself when the policy
    /// knows it, otherwise [`OTHER_VERB_LABEL`]
    pub fn verb_label(&self, verb: &str) -> String {
        let verb = normalize(verb);
        if self.allowlist.contains(&verb) || self.blocklist.contains(&verb) {
            verb
        } else {
            OTHER_VERB_LABEL.to_string()
        }
    }

    /// Bounded metric label for a rejected verb: the matched blocklist entry,
    /// or [`NOT_ALLOWED_LABEL`] for allow-list rejections
    pub fn rejection_label(&self, verb: &str) -> String {
        let verb = normalize(verb);
        if self.blocklist.contains(&verb) {
            verb
        } else {
            NOT_ALLOWED_LABEL.to_string()
        }
    }

    /// Check a command against the policy. Runs before any process exists.
    pub fn check(&self, spec: &CommandSpec) -> Result<()> {
        let verb = spec.primary_verb();
        if verb.is_empty() {
            return Err(GatewayError::InvalidRequest("command verb is empty".to_string()));
        }

        if let Some(blocked) = self.find_blocked(spec) {
            return Err(GatewayError::policy(
                blocked,
                "verb is on the destructive command blocklist",
            ));
        }

        if self.mode == PolicyMode::ReadOnly && self.has_chaining(spec) {
            return Err(GatewayError::policy(
                verb,
                "gateway is read-only and the command chains further commands",
            ));
        }

        if self.mode == PolicyMode::ReadOnly && !self.allowlist.contains(&verb) {
            return Err(GatewayError::policy(
                verb,
                "gateway is read-only and the verb is not on the read allow-list",
            ));
        }

        Ok(())
    }

    fn has_chaining(&self, spec: &CommandSpec) -> bool {
        command_parts(spec).any(|part| CHAINING_SEQUENCES.iter().any(|seq| part.contains(*seq)))
    }

    /// First blocklisted token anywhere in the command, including verbs
    /// chained through shell separators
    fn find_blocked(&self, spec: &CommandSpec) -> Option<String> {
        command_parts(spec)
            .flat_map(tokens)
            .find(|token| self.blocklist.contains(token))
    }
}

fn command_parts(spec: &CommandSpec) -> impl Iterator<Item = &str> {
    std::iter::once(spec.verb.as_str())
        .chain(spec.resource.as_deref())
        .chain(spec.name.as_deref())
        .chain(spec.args.iter().map(String::as_str))
}

fn normalize(verb: &str) -> String {
    verb.trim().to_lowercase()
}

fn tokens(part: &str) -> Vec<String> {
    part.replace(SHELL_SEPARATORS, " ")
        .split_whitespace()
        .map(normalize)
        .collect()
}
