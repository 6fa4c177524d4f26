//! Failing pods command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, FailingPodsRequest};
use crate::output::{
    color_confidence, color_status, print_json, print_rows, print_success, OutputFormat,
};

#[derive(Tabled)]
struct FailingPodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Cause")]
    cause: String,
}

pub async fn failing(
    client: &ApiClient,
    request: FailingPodsRequest,
    format: OutputFormat,
) -> Result<()> {
    let pods = client.failing_pods(&request).await?;

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            if pods.is_empty() {
                print_success("No failing pods");
                return Ok(());
            }

            let total = pods.len();
            let rows = pods
                .into_iter()
                .map(|p| FailingPodRow {
                    namespace: p.pod.namespace,
                    pod: p.pod.name,
                    phase: color_status(&p.phase),
                    category: color_status(&p.classification.category),
                    confidence: color_confidence(p.classification.confidence),
                    cause: cause(&p.classification.category, p.classification.cause, p.reasons),
                })
                .collect();
            print_rows::<FailingPodRow>(rows);
            println!("\nTotal: {} failing pods", total);
        }
    }
    Ok(())
}

/// Signature cause when one matched, otherwise the status signals
fn cause(category: &str, cause: String, reasons: Vec<String>) -> String {
    if category == "Unknown" && !reasons.is_empty() {
        reasons.join("; ")
    } else {
        cause
    }
}
