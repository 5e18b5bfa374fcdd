#![allow(dead_code)]

use std::path::Path;
use std::process;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use tempfile::TempDir;

pub const MAIN_SWIFT: &str = "let greeting: String = \"hello\"\nprint(greeting)\n";

/// A throwaway Swift package with one source file.
pub fn swift_workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp workspace");
    let sources = dir.path().join("Sources").join("App");
    std::fs::create_dir_all(&sources).expect("create Sources/App");
    std::fs::write(sources.join("main.swift"), MAIN_SWIFT).expect("write main.swift");
    std::fs::write(
        dir.path().join("Package.swift"),
        "// swift-tools-version:5.9\nimport PackageDescription\n\
         let package = Package(name: \"App\", targets: [.executableTarget(name: \"App\")])\n",
    )
    .expect("write Package.swift");
    dir
}

pub fn main_swift(workspace: &Path) -> String {
    workspace.join("Sources/App/main.swift").to_string_lossy().into_owned()
}

/// `lsp-bridge` wired to `cat` as its language server.
///
/// `cat` echoes every frame, so each request comes back as a server request,
/// gets answered with `null`, and that answer is echoed back as the reply.
/// Every query therefore resolves to an empty result.
pub fn echo_bridge(workspace: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("lsp-bridge");
    cmd.env_remove("LSP_BRIDGE_SERVER_ARGS")
        .env_remove("LSP_BRIDGE_REQUEST_TIMEOUT")
        .arg("--workspace")
        .arg(workspace)
        .arg("--server-path")
        .arg("cat")
        .arg("--settle-ms")
        .arg("100")
        .arg("--request-timeout")
        .arg("10");
    cmd
}

/// Whether a real `sourcekit-lsp` is on PATH.
pub fn sourcekit_available() -> bool {
    process::Command::new("sourcekit-lsp")
        .arg("--help")
        .stdout(process::Stdio::null())
        .stderr(process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
