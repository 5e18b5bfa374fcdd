#[path = "common.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("definition"))
        .stdout(predicate::str::contains("--server-path"));
}

#[test]
fn test_version() {
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("lsp-bridge"));
}

#[test]
fn test_non_numeric_line_is_rejected_by_cli() {
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.args(["hover", "main.swift", "-l", "ten", "-c", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_missing_server_executable() {
    let workspace = common::swift_workspace();
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.arg("--workspace")
        .arg(workspace.path())
        .arg("--server-path")
        .arg("/nonexistent/sourcekit-lsp")
        .args(["symbols", "Greeter"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to launch language server"));
}

#[test]
fn test_missing_workspace() {
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.args(["--workspace", "/no/such/workspace", "symbols", "Greeter"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Workspace directory not found"));
}

#[cfg(unix)]
#[test]
fn test_hover_with_empty_answer() {
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    common::echo_bridge(workspace.path())
        .args(["hover", &file, "-l", "1", "-c", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("No symbol information found at {file}:1:5")));
}

#[cfg(unix)]
#[test]
fn test_definition_and_references_with_empty_answer() {
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    common::echo_bridge(workspace.path())
        .args(["definition", &file, "-l", "2", "-c", "7"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("No definition found"));

    common::echo_bridge(workspace.path())
        .args(["references", &file, "-l", "2", "-c", "7", "--exclude-declaration"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("No references found"));
}

#[cfg(unix)]
#[test]
fn test_symbols_and_diagnostics_with_empty_answer() {
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    common::echo_bridge(workspace.path())
        .args(["symbols", "greeting"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No symbols found matching 'greeting'"));

    common::echo_bridge(workspace.path())
        .args(["diagnostics", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("No diagnostics reported"));
}

#[cfg(unix)]
#[test]
fn test_zero_line_fails_with_validation_message() {
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    common::echo_bridge(workspace.path())
        .args(["hover", &file, "-l", "0", "-c", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error: invalid arguments: line must be at least 1"));
}

#[cfg(unix)]
#[test]
fn test_missing_file_fails() {
    let workspace = common::swift_workspace();
    let missing = workspace.path().join("Sources/App/Missing.swift");

    common::echo_bridge(workspace.path())
        .arg("definition")
        .arg(&missing)
        .args(["-l", "1", "-c", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error: file not found"));
}

#[test]
fn test_real_sourcekit_hover() {
    if !common::sourcekit_available() {
        eprintln!("sourcekit-lsp not found on PATH; skipping");
        return;
    }
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    let output = cmd
        .arg("--workspace")
        .arg(workspace.path())
        .args(["hover", &file, "-l", "1", "-c", "5"])
        .output()
        .expect("failed to run lsp-bridge");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "command failed: {stdout}");
    assert!(predicate::str::contains("String").eval(&stdout), "unexpected hover: {stdout}");
}
