use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::bridge::position::file_uri;
use crate::bridge::Bridge;
use crate::cli::args::Commands;
use crate::config::BridgeConfig;
use crate::lsp::session::{client_capabilities, Session};
use crate::mcp::tools::{FileArgs, PositionArgs, QueryArgs, ReferencesArgs, ToolCall};
use crate::mcp::McpServer;
use crate::utils::error::BridgeError;

/// Start the language server and complete the handshake.
pub async fn connect(config: &BridgeConfig) -> Result<Arc<Session>> {
    let session = Session::start(config.workspace_root(), &config.server)
        .with_context(|| format!("Failed to start '{}'", config.server.label()))?
        .with_request_timeout(config.request_timeout);

    let root_uri = file_uri(config.workspace_root())?;
    session
        .initialize(&root_uri, client_capabilities(), None)
        .await
        .with_context(|| format!("Language server '{}' did not initialize", config.server.label()))?;

    Ok(Arc::new(session))
}

/// Orderly teardown; a server that already went away is not an error here.
async fn disconnect(session: &Session) {
    match session.shutdown().await {
        Ok(()) => {}
        Err(BridgeError::ConnectionClosed) => {
            tracing::debug!("Language server already gone at shutdown");
        }
        Err(e) => tracing::warn!("Language server shutdown failed: {e}"),
    }
}

fn bridge(session: &Arc<Session>, config: &BridgeConfig) -> Bridge {
    Bridge::new(Arc::clone(session)).with_diagnostics_settle(config.diagnostics_settle)
}

pub async fn handle_serve_command(config: &BridgeConfig) -> Result<()> {
    let session = connect(config).await?;
    let server = McpServer::new(Arc::new(bridge(&session, config)));

    let served = server.serve(tokio::io::stdin(), tokio::io::stdout()).await;
    disconnect(&session).await;
    served.context("MCP server failed")
}

/// Run one tool, print its rendered text, and report whether it succeeded.
pub async fn handle_tool_command(config: &BridgeConfig, call: ToolCall) -> Result<bool> {
    let session = connect(config).await?;
    let response = call.execute(&bridge(&session, config)).await;
    disconnect(&session).await;

    println!("{}", response.text);
    Ok(!response.is_error())
}

fn path_arg(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

/// Map a one-shot subcommand to the tool it runs. `None` for `serve`.
pub fn tool_call_for(command: &Commands) -> Option<ToolCall> {
    let call = match command {
        Commands::Serve => return None,
        Commands::Hover { file, line, column } => ToolCall::SymbolInfo(PositionArgs {
            file_path: path_arg(file),
            line: *line,
            column: *column,
        }),
        Commands::Definition { file, line, column } => ToolCall::Definition(PositionArgs {
            file_path: path_arg(file),
            line: *line,
            column: *column,
        }),
        Commands::References { file, line, column, exclude_declaration } => {
            ToolCall::References(ReferencesArgs {
                file_path: path_arg(file),
                line: *line,
                column: *column,
                include_declaration: Some(!exclude_declaration),
            })
        }
        Commands::Symbols { query } => ToolCall::WorkspaceSymbols(QueryArgs { query: query.clone() }),
        Commands::Diagnostics { file } => ToolCall::Diagnostics(FileArgs { file_path: path_arg(file) }),
    };
    Some(call)
}
