//! MCP tool server: reads requests line by line, answers through one writer task.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::bridge::{Bridge, ToolResponse};
use crate::mcp::protocol::{
    method, InitializeParams, InitializeResult, McpError, McpRequest, McpResponse, ServerInfo,
    ToolCallParams, DEFAULT_PROTOCOL_VERSION,
};
use crate::mcp::tools::{self, ToolCall};
use crate::utils::error::Result;

pub const SERVER_NAME: &str = "lsp-bridge";

/// How long in-flight calls may keep running after the client closes input.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

enum Dispatch {
    Reply(McpResponse),
    Call { id: Value, call: ToolCall },
    Ignore,
}

pub struct McpServer {
    bridge: Arc<Bridge>,
    drain_timeout: Duration,
}

impl McpServer {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge, drain_timeout: DEFAULT_DRAIN_TIMEOUT }
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Serve until `input` reaches EOF. In-flight tool calls get up to the
    /// drain timeout to finish and have their responses written; the rest are
    /// abandoned.
    pub async fn serve<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<McpResponse>();
        let writer = tokio::spawn(write_loop(output, rx));
        let mut calls = JoinSet::new();
        let mut lines = BufReader::new(input).lines();

        tracing::info!("MCP server ready on stdio");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            while let Some(finished) = calls.try_join_next() {
                log_task_result(finished);
            }

            match self.dispatch(line) {
                Dispatch::Reply(response) => {
                    let _ = tx.send(response);
                }
                Dispatch::Call { id, call } => {
                    let bridge = Arc::clone(&self.bridge);
                    let tx = tx.clone();
                    calls.spawn(async move {
                        let name = call.name();
                        tracing::debug!("tools/call {name} (id {id})");
                        let response = call.execute(&bridge).await;
                        if response.is_error() {
                            tracing::debug!("{name} returned an error: {}", response.text);
                        }
                        let _ = tx.send(McpResponse::success(id, tools::tool_result(&response)));
                    });
                }
                Dispatch::Ignore => {}
            }
        }

        tracing::info!("MCP client closed input; waiting for {} call(s)", calls.len());
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(finished) = calls.join_next().await {
                log_task_result(finished);
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "Abandoning {} tool call(s) still running after {:?}",
                calls.len(),
                self.drain_timeout
            );
            calls.shutdown().await;
        }
        drop(tx);
        if let Err(e) = writer.await {
            tracing::warn!("MCP writer task failed: {e}");
        }
        Ok(())
    }

    fn dispatch(&self, line: &str) -> Dispatch {
        let Ok(message) = serde_json::from_str::<Value>(line) else {
            tracing::warn!("Unparseable MCP message: {line}");
            return Dispatch::Reply(McpResponse::error(Value::Null, McpError::parse_error()));
        };

        let request = match serde_json::from_value::<McpRequest>(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                // Replies to requests we never sent.
                if message.get("result").is_some() || message.get("error").is_some() {
                    return Dispatch::Ignore;
                }
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                return Dispatch::Reply(McpResponse::error(id, McpError::invalid_request(e.to_string())));
            }
        };

        let Some(id) = request.id else {
            tracing::debug!("MCP notification: {}", request.method);
            return Dispatch::Ignore;
        };

        match request.method.as_str() {
            method::INITIALIZE => Dispatch::Reply(self.initialize(id, request.params)),
            method::PING => Dispatch::Reply(McpResponse::success(id, json!({}))),
            method::TOOLS_LIST => {
                Dispatch::Reply(McpResponse::success(id, json!({"tools": tools::definitions()})))
            }
            method::TOOLS_CALL => Self::tool_call(id, request.params),
            other => {
                tracing::debug!("Unknown MCP method: {other}");
                Dispatch::Reply(McpResponse::error(id, McpError::method_not_found(other)))
            }
        }
    }

    fn initialize(&self, id: Value, params: Value) -> McpResponse {
        let params: InitializeParams = serde_json::from_value(params).unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(
                "MCP client {} {}",
                client.name,
                client.version.as_deref().unwrap_or("(unknown version)")
            );
        }
        if let Some(server) = self.bridge.session().server_info().and_then(|r| r.server_info) {
            tracing::debug!("Answering initialize on behalf of {}", server.name);
        }

        let result = InitializeResult {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            capabilities: json!({"tools": {"listChanged": false}}),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        }
    }

    fn tool_call(id: Value, params: Value) -> Dispatch {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return Dispatch::Reply(McpResponse::error(
                    id,
                    McpError::invalid_params(format!("Invalid tools/call parameters: {e}")),
                ));
            }
        };

        match ToolCall::parse(&params.name, params.arguments) {
            Ok(call) => Dispatch::Call { id, call },
            Err(e) => {
                let response = ToolResponse::failure(&e);
                Dispatch::Reply(McpResponse::success(id, tools::tool_result(&response)))
            }
        }
    }
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Tool call task failed: {e}");
    }
}

async fn write_loop<W>(mut output: W, mut rx: mpsc::UnboundedReceiver<McpResponse>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        if let Err(e) = write_message(&mut output, &response).await {
            tracing::warn!("Failed to write MCP response: {e}");
            break;
        }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(output: &mut W, response: &McpResponse) -> Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
