//! Kube Gateway CLI
//!
//! Troubleshoot pods, inspect node health and run policy-checked kubectl
//! commands through a kube gateway server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{FailingPodsRequest, NodeScanRequest, TroubleshootRequest};
use commands::{exec, failing, nodes, troubleshoot};
use output::OutputFormat;

/// Kube Gateway CLI
#[derive(Parser)]
#[command(name = "kgw")]
#[command(author, version, about = "CLI for the Kube Gateway", long_about = None)]
pub struct Cli {
    /// Gateway API URL (can also be set via KGW_API_URL env var)
    #[arg(long, env = "KGW_API_URL")]
    pub api_url: Option<String>,

    /// Cluster context (defaults to the gateway's current context)
    #[arg(long, env = "KGW_CONTEXT")]
    pub context: Option<String>,

    /// Identity recorded in the gateway audit log
    #[arg(long, env = "KGW_USER")]
    pub requested_by: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose why a pod is failing
    Troubleshoot {
        /// Pod name
        pod: String,

        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Run a kubectl command through the gateway's safety policy
    Exec {
        #[arg(long, short)]
        namespace: Option<String>,

        /// Command to run, e.g. `get pods -l app=web`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show node health and memory utilization
    Nodes {
        /// Memory utilization threshold in percent
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// List failing pods with their diagnosis
    Failing {
        /// Namespace to scan (uses the configured default if not specified)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Scan every namespace
        #[arg(long, short = 'A', conflicts_with = "namespace")]
        all_namespaces: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(config.api_url.clone())
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let format = match cli.format {
        Some(format) => format,
        None => config
            .default_format
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or_default(),
    };
    let context = cli.context.or(config.default_context.clone());
    let requested_by = cli.requested_by.or(config.requested_by.clone());

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Troubleshoot { pod, namespace } => {
            let request = TroubleshootRequest {
                pod,
                namespace: namespace.unwrap_or_else(|| config.namespace()),
                context,
                requested_by,
            };
            troubleshoot::troubleshoot(&client, request, format).await?;
        }
        Commands::Exec { namespace, command } => {
            let namespace = namespace.or(config.default_namespace.clone());
            let request = exec::build_request(&command, namespace, context, requested_by)?;
            exec::exec(&client, request, format).await?;
        }
        Commands::Nodes { threshold } => {
            let request = NodeScanRequest {
                context,
                threshold_percent: threshold,
                requested_by,
            };
            nodes::nodes(&client, request, format).await?;
        }
        Commands::Failing {
            namespace,
            all_namespaces,
        } => {
            let namespace = if all_namespaces {
                None
            } else {
                Some(namespace.unwrap_or_else(|| config.namespace()))
            };
            let request = FailingPodsRequest {
                namespace,
                context,
                requested_by,
            };
            failing::failing(&client, request, format).await?;
        }
    }

    Ok(())
}
