use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use lsp_bridge::cli::args::Cli;
use lsp_bridge::commands::{handle_serve_command, handle_tool_command, tool_call_for};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries MCP traffic; logs go to stderr only.
    let default_filter = if cli.verbose { "lsp_bridge=debug" } else { "lsp_bridge=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config()?;

    let succeeded = match tool_call_for(&cli.command) {
        Some(call) => handle_tool_command(&config, call).await?,
        None => {
            handle_serve_command(&config).await?;
            true
        }
    };

    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
