//! Node health command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, NodeHealth, NodeScanRequest};
use crate::output::{color_status, print_info, print_json, print_rows, print_success, OutputFormat};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

impl From<&NodeHealth> for NodeRow {
    fn from(n: &NodeHealth) -> Self {
        Self {
            node: n.node.clone(),
            status: color_status(&n.status),
            memory: format!("{:.1}%", n.utilization_percent),
            reasons: n.reasons.join("; "),
        }
    }
}

pub async fn nodes(client: &ApiClient, request: NodeScanRequest, format: OutputFormat) -> Result<()> {
    let verdicts = client.scan_nodes(&request).await?;

    match format {
        OutputFormat::Json => print_json(&verdicts)?,
        OutputFormat::Table => {
            if verdicts.is_empty() {
                print_info("No nodes found");
                return Ok(());
            }
            let unhealthy = verdicts
                .iter()
                .filter(|n| !n.status.eq_ignore_ascii_case("healthy"))
                .count();

            print_rows(verdicts.iter().map(NodeRow::from).collect());
            if unhealthy == 0 {
                print_success(&format!("All {} nodes healthy", verdicts.len()));
            } else {
                print_info(&format!("{} of {} nodes need attention", unhealthy, verdicts.len()));
            }
        }
    }
    Ok(())
}
