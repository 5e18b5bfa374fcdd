use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{BridgeConfig, DEFAULT_SERVER_PATH};
use crate::lsp::process::ServerCommand;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::Cyan.on_default().bold())
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().bold());

const AFTER_HELP: &str = "\x1b[1;32mQuick Reference:\x1b[0m
  \x1b[1;36mRun as an MCP tool server\x1b[0m (what agents launch):
    lsp-bridge --workspace ~/src/MyApp serve

  \x1b[1;36mOne-off queries\x1b[0m (same tools, printed to stdout):
    lsp-bridge hover Sources/App/main.swift -l 10 -c 5       Type signature and docs
    lsp-bridge definition Sources/App/main.swift -l 10 -c 5  Where a symbol is defined
    lsp-bridge references Sources/App/main.swift -l 10 -c 5  Every usage of a symbol
    lsp-bridge symbols Greeter                               Search symbols by name
    lsp-bridge diagnostics Sources/App/main.swift            Errors and warnings

  \x1b[1;36mEnvironment:\x1b[0m
    LSP_BRIDGE_SERVER_PATH, LSP_BRIDGE_SERVER_ARGS, LSP_BRIDGE_REQUEST_TIMEOUT, LSP_BRIDGE_SETTLE_MS";

#[derive(Parser, Debug)]
#[command(name = "lsp-bridge")]
#[command(about = "Expose a language server's code intelligence as MCP tools (sourcekit-lsp by default)")]
#[command(version)]
#[command(styles = STYLES)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root handed to the language server (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Language server executable
    #[arg(
        long,
        global = true,
        env = "LSP_BRIDGE_SERVER_PATH",
        default_value = DEFAULT_SERVER_PATH,
        value_name = "PATH"
    )]
    pub server_path: String,

    /// Extra argument for the language server (repeatable; the environment
    /// variable is split on spaces)
    #[arg(
        long = "server-arg",
        global = true,
        env = "LSP_BRIDGE_SERVER_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        value_name = "ARG"
    )]
    pub server_args: Vec<String>,

    /// Give up on a language server reply after this many seconds (default: wait)
    #[arg(long, global = true, env = "LSP_BRIDGE_REQUEST_TIMEOUT", value_name = "SECONDS")]
    pub request_timeout: Option<u64>,

    /// How long `diagnostics` waits for a fresh publish after opening a file
    #[arg(
        long,
        global = true,
        env = "LSP_BRIDGE_SETTLE_MS",
        default_value_t = 2000,
        value_name = "MILLIS"
    )]
    pub settle_ms: u64,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve flags and environment into a session configuration.
    pub fn config(&self) -> Result<BridgeConfig> {
        let workspace = match &self.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let workspace_root = workspace
            .canonicalize()
            .with_context(|| format!("Workspace directory not found: {}", workspace.display()))?;
        if !workspace_root.is_dir() {
            anyhow::bail!("Workspace is not a directory: {}", workspace_root.display());
        }

        let server_args = self.server_args.iter().filter(|arg| !arg.is_empty()).cloned().collect();

        Ok(BridgeConfig::new(workspace_root)
            .with_server(ServerCommand::new(self.server_path.clone(), server_args))
            .with_request_timeout(self.request_timeout.map(Duration::from_secs))
            .with_diagnostics_settle(Duration::from_millis(self.settle_ms)))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP tool server on stdin/stdout
    #[command(
        long_about = "Run the MCP tool server on stdin/stdout. The language server is started \
        once and kept for the whole session; it is shut down when stdin closes.\n\n\
        Examples:\n  \
        lsp-bridge --workspace ~/src/MyApp serve\n  \
        lsp-bridge --server-path /usr/bin/clangd serve"
    )]
    Serve,

    /// Show type signature and documentation at a specific file location
    Hover {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,
    },

    /// Jump to definition from a specific file location (line + column)
    Definition {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,
    },

    /// Find every place a symbol is used across the workspace
    References {
        file: PathBuf,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long)]
        column: u32,

        /// Leave the declaration itself out of the results
        #[arg(long)]
        exclude_declaration: bool,
    },

    /// Search for symbols by name across the workspace
    Symbols { query: String },

    /// Show the compiler diagnostics for a file
    Diagnostics { file: PathBuf },
}
