//! Run a kubectl command through the gateway

use anyhow::{bail, Result};
use colored::Colorize;

use crate::client::{ApiClient, ApiError, ExecuteRequest};
use crate::output::{print_error, print_json, OutputFormat};

/// Split `command` into the verb and its arguments
pub fn build_request(
    command: &[String],
    namespace: Option<String>,
    context: Option<String>,
    requested_by: Option<String>,
) -> Result<ExecuteRequest> {
    let Some((verb, args)) = command.split_first() else {
        bail!("No command given, e.g. `kgw exec get pods`");
    };

    // Allow a leading "kubectl" when pasting commands.
    let (verb, args) = match (verb.as_str(), args.split_first()) {
        ("kubectl", Some((verb, args))) => (verb, args),
        _ => (verb, args),
    };

    Ok(ExecuteRequest {
        verb: verb.clone(),
        args: args.to_vec(),
        namespace,
        context,
        requested_by,
    })
}

pub async fn exec(client: &ApiClient, request: ExecuteRequest, format: OutputFormat) -> Result<()> {
    let result = match client.execute(&request).await {
        Ok(result) => result,
        Err(e) => {
            if let Some(api_err) = e.downcast_ref::<ApiError>().filter(|e| e.is_forbidden()) {
                print_error(&format!("'{}' was rejected: {}", request.verb, api_err.message));
            }
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print!("{}", result.stdout);
            if !result.stderr.trim().is_empty() {
                eprint!("{}", result.stderr.yellow());
            }
        }
    }
    Ok(())
}
