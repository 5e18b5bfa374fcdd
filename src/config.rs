use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::DEFAULT_DIAGNOSTICS_SETTLE;
use crate::lsp::process::ServerCommand;

pub const DEFAULT_SERVER_PATH: &str = "sourcekit-lsp";

/// Everything needed to start one bridge session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Canonical workspace root; also the server's working directory.
    pub workspace_root: PathBuf,
    pub server: ServerCommand,
    /// `None` waits for every reply indefinitely.
    pub request_timeout: Option<Duration>,
    pub diagnostics_settle: Duration,
}

impl BridgeConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            server: ServerCommand::new(DEFAULT_SERVER_PATH, Vec::new()),
            request_timeout: None,
            diagnostics_settle: DEFAULT_DIAGNOSTICS_SETTLE,
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerCommand) -> Self {
        self.server = server;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_diagnostics_settle(mut self, settle: Duration) -> Self {
        self.diagnostics_settle = settle;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
