//! Kube Gateway - safe kubectl execution and cluster diagnostics
//!
//! Serves the gateway operations over HTTP. Every command is checked
//! against the configured safety policy before kubectl is invoked.

use anyhow::Result;
use gateway_lib::{
    context::materialize_ini_kubeconfig,
    health::{components, ComponentHealth, HealthRegistry},
    AuditLogger, CommandGateway, ContextResolver, KubectlRunner, Troubleshooter,
};
use kube_gateway::{api, config::GatewayConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = GatewayConfig::load()?;
    info!(
        port = config.api_port,
        read_only = config.read_only,
        kubectl = %config.kubectl_binary,
        "Gateway configured"
    );

    let audit = AuditLogger::new("kube-gateway");
    audit.log_startup(GATEWAY_VERSION, config.read_only);

    let health_registry = HealthRegistry::new();

    // Must outlive the server: the temp file is removed on drop.
    let secrets_kubeconfig =
        materialize_ini_kubeconfig(&config.secrets_ini_path, config.temp_dir.as_deref())?;
    let resolver = config.context_resolver(secrets_kubeconfig.as_ref().map(|f| f.path()));
    health_registry
        .update(
            components::KUBECONFIG,
            ComponentHealth::from_probe(&resolver.resolve(config.default_context.as_deref())),
        )
        .await;

    let runner = KubectlRunner::new(&config.kubectl_binary);
    match runner.verify().await {
        Ok(version) => {
            info!(version = %version, "kubectl available");
            health_registry.set_healthy(components::KUBECTL).await;
        }
        Err(e) => {
            warn!(error = %e, "kubectl is not usable");
            health_registry
                .set_unhealthy(components::KUBECTL, e.to_string())
                .await;
        }
    }

    let gateway = Arc::new(
        CommandGateway::new(
            Arc::new(config.policy()),
            Arc::new(runner),
            config.command_timeout(),
        )
        .with_audit(audit.clone()),
    );
    let troubleshooter = Arc::new(
        Troubleshooter::new(Arc::clone(&gateway), config.troubleshoot_config())
            .with_audit(audit.clone()),
    );

    let state = Arc::new(api::AppState {
        gateway,
        troubleshooter,
        resolver,
        health_registry: health_registry.clone(),
        memory_threshold_percent: config.memory_threshold_percent,
    });

    health_registry.set_ready(true).await;

    api::serve(config.api_port, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await?;

    audit.log_shutdown("SIGINT received");
    drop(secrets_kubeconfig);
    Ok(())
}
