//! CLI integration tests

use std::process::Command;

fn run(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "kgw-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Kube Gateway"), "Should show app name");
    assert!(stdout.contains("troubleshoot"), "Should show troubleshoot command");
    assert!(stdout.contains("exec"), "Should show exec command");
    assert!(stdout.contains("nodes"), "Should show nodes command");
    assert!(stdout.contains("failing"), "Should show failing command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

#[test]
fn test_cli_version() {
    let output = run(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("kgw"), "Should show binary name");
}

#[test]
fn test_troubleshoot_help() {
    let output = run(&["troubleshoot", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Troubleshoot help should succeed");
    assert!(stdout.contains("<POD>"), "Should show pod argument");
    assert!(stdout.contains("--namespace"), "Should show namespace option");
}

#[test]
fn test_failing_rejects_namespace_with_all_namespaces() {
    let output = run(&["failing", "-n", "shop", "-A"]);
    assert!(!output.status.success(), "Conflicting flags should fail");
}

#[test]
fn test_exec_requires_command() {
    let output = run(&["exec"]);
    assert!(!output.status.success(), "Exec without a command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<COMMAND>"), "Should name the missing argument");
}

#[test]
fn test_invalid_format_is_rejected() {
    let output = run(&["--format", "yaml", "nodes"]);
    assert!(!output.status.success(), "Unknown format should fail");
}
