//! Pod troubleshooting command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DiagnosticReport, TroubleshootRequest};
use crate::output::{
    color_confidence, color_status, format_timestamp, print_json, print_rows, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct SubCallRow {
    #[tabled(rename = "Sub-query")]
    name: String,
    #[tabled(rename = "Outcome")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub async fn troubleshoot(
    client: &ApiClient,
    request: TroubleshootRequest,
    format: OutputFormat,
) -> Result<()> {
    let report = client.troubleshoot(&request).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &DiagnosticReport) {
    println!("{}", "Diagnostic Report".bold());
    println!("{}", "=".repeat(60));
    println!(
        "Pod:        {}/{}",
        report.target.namespace,
        report.target.name.cyan()
    );
    println!("Context:    {}", report.context);
    println!("Report:     {}", color_status(&report.status));
    println!("Generated:  {}", format_timestamp(&report.generated_at));
    println!("Request ID: {}", report.request_id.dimmed());
    println!();

    match &report.classification {
        Some(c) => {
            println!("{}", "Diagnosis".bold());
            println!("{}", "-".repeat(60));
            println!("Category:    {}", color_status(&c.category).bold());
            println!("Confidence:  {}", color_confidence(c.confidence));
            println!("Cause:       {}", c.cause);
            if !c.evidence.is_empty() {
                println!("Evidence:");
                for e in &c.evidence {
                    println!("  - {} = {}", e.field.cyan(), e.value);
                }
            }
            println!("Remediation: {}", c.remediation);
            println!();
        }
        None => print_warning("No classification could be computed"),
    }

    let rows: Vec<SubCallRow> = report
        .sub_calls
        .iter()
        .map(|s| SubCallRow {
            name: s.name.clone(),
            status: color_status(&s.status),
            reason: s.reason.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(rows);

    if let Some(logs) = report.log_tail.as_deref().filter(|l| !l.trim().is_empty()) {
        println!();
        println!("{}", "Recent Logs".bold());
        println!("{}", "-".repeat(60));
        println!("{}", logs.trim_end());
    }
}
