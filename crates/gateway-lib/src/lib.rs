//! Core library for the kube gateway
//!
//! This crate provides the core functionality for:
//! - Policy-checked command execution against a cluster CLI
//! - Parsing of the CLI's machine-readable output
//! - Pod failure classification and node health evaluation
//! - Troubleshooting orchestration with partial-failure tolerance
//! - Health checks and observability

pub mod classifier;
pub mod context;
pub mod error;
pub mod failing;
pub mod gateway;
pub mod health;
pub mod models;
pub mod node_health;
pub mod observability;
pub mod orchestrator;
pub mod parser;
pub mod policy;

pub use classifier::{classify, Classifier, ClassifierConfig};
pub use context::{ContextResolver, KubeconfigResolver, StaticResolver};
pub use error::{GatewayError, Result};
pub use failing::failure_reasons;
pub use gateway::{CommandGateway, CommandRunner, KubectlRunner};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry};
pub use models::*;
pub use node_health::evaluate;
pub use observability::{AuditLogger, GatewayMetrics};
pub use orchestrator::{TroubleshootConfig, Troubleshooter};
pub use policy::{PolicyMode, SafetyPolicy};
