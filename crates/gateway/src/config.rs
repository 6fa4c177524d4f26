//! Gateway configuration

use anyhow::Result;
use gateway_lib::classifier::ClassifierConfig;
use gateway_lib::policy::{PolicyMode, DEFAULT_BLOCKLIST, READ_ONLY_VERBS};
use gateway_lib::{
    ClusterContext, ContextResolver, KubeconfigResolver, SafetyPolicy, StaticResolver,
    TroubleshootConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Gateway configuration, read from `KGW_*` environment variables and an
/// optional file named by `KGW_CONFIG_FILE`
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path or name of the kubectl binary
    #[serde(default = "default_kubectl_binary")]
    pub kubectl_binary: String,

    /// Kubeconfig to resolve contexts from; falls back to `KUBECONFIG`
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Secrets file with an embedded kubeconfig, preferred when present
    #[serde(default = "default_secrets_ini_path")]
    pub secrets_ini_path: PathBuf,

    /// Directory for the kubeconfig extracted from the secrets file;
    /// the system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Context used when a request names none and no kubeconfig is found
    #[serde(default)]
    pub default_context: Option<String>,

    #[serde(default = "default_read_only")]
    pub read_only: bool,

    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_sub_query_timeout")]
    pub sub_query_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_percent: f64,

    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,

    #[serde(default = "default_event_window")]
    pub event_window: usize,

    #[serde(default = "default_crashloop_threshold")]
    pub crashloop_restart_threshold: u32,
}

fn default_api_port() -> u16 {
    8080
}

fn default_kubectl_binary() -> String {
    "kubectl".to_string()
}

fn default_secrets_ini_path() -> PathBuf {
    PathBuf::from("/vault/secrets/kubectl.ini")
}

fn default_read_only() -> bool {
    true
}

fn default_blocklist() -> Vec<String> {
    DEFAULT_BLOCKLIST.iter().map(|v| v.to_string()).collect()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_sub_query_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    45
}

fn default_max_concurrency() -> usize {
    4
}

fn default_memory_threshold() -> f64 {
    80.0
}

fn default_log_tail_lines() -> u32 {
    50
}

fn default_event_window() -> usize {
    50
}

fn default_crashloop_threshold() -> u32 {
    3
}

impl GatewayConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_sources(
            config::Environment::with_prefix("KGW"),
            std::env::var("KGW_CONFIG_FILE").ok(),
        )
    }

    fn from_sources(env: config::Environment, file: Option<String>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(&file).required(true));
        }

        let config = builder
            .add_source(
                env.try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("blocklist"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn policy(&self) -> SafetyPolicy {
        let mode = if self.read_only {
            PolicyMode::ReadOnly
        } else {
            PolicyMode::ReadWrite
        };
        SafetyPolicy::new(mode, &self.blocklist, READ_ONLY_VERBS)
    }

    /// Pick where contexts come from: the extracted secrets kubeconfig, the
    /// configured file, then whatever kubectl would load from `KUBECONFIG`
    /// or `~/.kube/config`. Falls back to a single static context.
    pub fn context_resolver(&self, secrets_kubeconfig: Option<&Path>) -> Arc<dyn ContextResolver> {
        let explicit = secrets_kubeconfig
            .map(Path::to_path_buf)
            .or_else(|| self.kubeconfig.clone().filter(|p| p.exists()));

        if let Some(path) = explicit {
            info!(kubeconfig = %path.display(), "Resolving contexts from kubeconfig file");
            return Arc::new(KubeconfigResolver::new(path));
        }

        let from_env = KubeconfigResolver::from_env();
        if !from_env.contexts().is_empty() {
            info!("Resolving contexts from the inherited kubeconfig");
            return Arc::new(from_env);
        }

        let name = self.default_context.as_deref().unwrap_or("default");
        warn!(context = %name, "No kubeconfig found, using a single static context");
        Arc::new(StaticResolver::new().with_context(ClusterContext::new(name)))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn troubleshoot_config(&self) -> TroubleshootConfig {
        TroubleshootConfig {
            sub_query_timeout: Duration::from_secs(self.sub_query_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_concurrency: self.max_concurrency,
            log_tail_lines: self.log_tail_lines,
            classifier: ClassifierConfig {
                crashloop_restart_threshold: self.crashloop_restart_threshold,
                event_window: self.event_window,
            },
        }
    }
}
