//! JSON-RPC 2.0 message types for the MCP side of the bridge.
//!
//! MCP messages travel as one JSON object per line on stdin/stdout. Request
//! ids are echoed back verbatim, so they stay as raw [`Value`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision answered when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Incoming request or notification. Notifications carry no `id`.
///
/// # Example
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 3,
///   "method": "tools/call",
///   "params": {"name": "definition", "arguments": {"file_path": "/w/a.swift", "line": 1, "column": 5}}
/// }
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct McpRequest {
    #[serde(default)]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default)]
    pub params: Value,
}

impl McpRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing response. Either `result` or `error` is present, never both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct McpResponse {
    pub jsonrpc: String,

    pub id: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    pub fn error(id: Value, error: McpError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct McpError {
    pub code: i32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// Parse error (-32700): the line was not JSON
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Invalid request (-32600): JSON, but not a request object
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::new(-32601, format!("Method not found: {method}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,

    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

#[derive(Serialize, Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Deserialize, Debug)]
pub struct ToolCallParams {
    pub name: String,

    #[serde(default)]
    pub arguments: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_id_is_notification() {
        let request: McpRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(request.is_notification());
        assert!(request.params.is_null());
    }

    #[test]
    fn test_string_ids_are_preserved() {
        let request: McpRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "abc-1", "method": "ping"}))
                .unwrap();
        let response = McpResponse::success(request.id.unwrap(), json!({}));
        assert_eq!(serde_json::to_value(&response).unwrap()["id"], "abc-1");
    }

    #[test]
    fn test_error_response_omits_result() {
        let response = McpResponse::error(json!(7), McpError::method_not_found("resources/list"));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["error"]["message"], "Method not found: resources/list");
        assert!(response.is_error());
    }

    #[test]
    fn test_standard_error_codes() {
        assert_eq!(McpError::parse_error().code, -32700);
        assert_eq!(McpError::invalid_request("x").code, -32600);
        assert_eq!(McpError::invalid_params("x").code, -32602);
        assert_eq!(McpError::internal_error("x").code, -32603);
    }

    #[test]
    fn test_initialize_params_tolerate_missing_fields() {
        let params: InitializeParams = serde_json::from_value(json!({})).unwrap();
        assert!(params.protocol_version.is_none());

        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "agent", "version": "1.0"}
        }))
        .unwrap();
        assert_eq!(params.protocol_version.as_deref(), Some("2025-03-26"));
        assert_eq!(params.client_info.unwrap().name, "agent");
    }
}
