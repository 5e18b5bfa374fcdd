#[path = "common.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{json, Value};

fn responses(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

fn by_id(responses: &[Value], id: u64) -> &Value {
    responses
        .iter()
        .find(|response| response["id"] == id)
        .unwrap_or_else(|| panic!("no response with id {id} in {responses:?}"))
}

#[test]
fn test_serve_fails_when_server_cannot_start() {
    let workspace = common::swift_workspace();
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.arg("--workspace")
        .arg(workspace.path())
        .arg("--server-path")
        .arg("/nonexistent/sourcekit-lsp")
        .arg("serve")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to launch language server"));
}

#[cfg(unix)]
#[test]
fn test_serve_session_over_stdio() {
    let workspace = common::swift_workspace();
    let file = common::main_swift(workspace.path());

    let script = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "test"}}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "definition", "arguments": {"file_path": file, "line": 1, "column": 5}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "symbol_info", "arguments": {"file_path": file, "line": 0, "column": 5}}}),
        json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}),
    ]
    .iter()
    .map(|message| format!("{message}\n"))
    .collect::<String>()
        + "this is not json\n";

    let output = common::echo_bridge(workspace.path())
        .arg("serve")
        .write_stdin(script)
        .output()
        .expect("failed to run lsp-bridge serve");
    assert!(
        output.status.success(),
        "serve failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let responses = responses(&output.stdout);
    assert_eq!(responses.len(), 6, "{responses:?}");

    assert_eq!(by_id(&responses, 1)["result"]["serverInfo"]["name"], "lsp-bridge");
    assert_eq!(by_id(&responses, 2)["result"]["tools"].as_array().unwrap().len(), 5);

    let definition = &by_id(&responses, 3)["result"];
    assert_eq!(definition["isError"], false);
    assert!(definition["content"][0]["text"].as_str().unwrap().starts_with("No definition found"));

    let invalid = &by_id(&responses, 4)["result"];
    assert_eq!(invalid["isError"], true);
    assert_eq!(invalid["_meta"]["errorTag"], "validation");

    assert_eq!(by_id(&responses, 5)["error"]["code"], -32601);
    assert!(responses.iter().any(|r| r["id"].is_null() && r["error"]["code"] == -32700));
}
