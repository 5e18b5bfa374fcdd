//! The five bridge tools: schemas, argument parsing and dispatch.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::bridge::{parse_arguments, Bridge, ToolResponse};
use crate::utils::error::{BridgeError, Result};

pub const SYMBOL_INFO: &str = "symbol_info";
pub const DEFINITION: &str = "definition";
pub const REFERENCES: &str = "references";
pub const WORKSPACE_SYMBOLS: &str = "workspace_symbols";
pub const DIAGNOSTICS: &str = "diagnostics";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PositionArgs {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReferencesArgs {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub include_declaration: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileArgs {
    pub file_path: String,
}

/// A parsed `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    SymbolInfo(PositionArgs),
    Definition(PositionArgs),
    References(ReferencesArgs),
    WorkspaceSymbols(QueryArgs),
    Diagnostics(FileArgs),
}

impl ToolCall {
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self> {
        let arguments = arguments.unwrap_or_else(|| json!({}));
        match name {
            SYMBOL_INFO => Ok(Self::SymbolInfo(parse_arguments(arguments)?)),
            DEFINITION => Ok(Self::Definition(parse_arguments(arguments)?)),
            REFERENCES => Ok(Self::References(parse_arguments(arguments)?)),
            WORKSPACE_SYMBOLS => Ok(Self::WorkspaceSymbols(parse_arguments(arguments)?)),
            DIAGNOSTICS => Ok(Self::Diagnostics(parse_arguments(arguments)?)),
            other => Err(BridgeError::validation(format!("unknown tool '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SymbolInfo(_) => SYMBOL_INFO,
            Self::Definition(_) => DEFINITION,
            Self::References(_) => REFERENCES,
            Self::WorkspaceSymbols(_) => WORKSPACE_SYMBOLS,
            Self::Diagnostics(_) => DIAGNOSTICS,
        }
    }

    pub async fn execute(self, bridge: &Bridge) -> ToolResponse {
        match self {
            Self::SymbolInfo(args) => bridge.symbol_info(&args.file_path, args.line, args.column).await,
            Self::Definition(args) => bridge.definition(&args.file_path, args.line, args.column).await,
            Self::References(args) => {
                bridge
                    .references(&args.file_path, args.line, args.column, args.include_declaration)
                    .await
            }
            Self::WorkspaceSymbols(args) => bridge.workspace_symbols(&args.query).await,
            Self::Diagnostics(args) => bridge.diagnostics(&args.file_path).await,
        }
    }
}

/// MCP `CallToolResult` for a rendered response.
pub fn tool_result(response: &ToolResponse) -> Value {
    let mut result = json!({
        "content": [{"type": "text", "text": response.text}],
        "isError": response.is_error(),
    });
    if let Some(tag) = response.error {
        result["_meta"] = json!({"errorTag": tag});
    }
    result
}

fn position_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": {"type": "string", "description": description},
            "line": {"type": "integer", "minimum": 1, "description": "1-based line number"},
            "column": {"type": "integer", "minimum": 1, "description": "1-based column number"}
        },
        "required": ["file_path", "line", "column"]
    })
}

/// Tool descriptors for `tools/list`.
pub fn definitions() -> Value {
    let mut references = position_schema("Path of the file containing the symbol");
    references["properties"]["include_declaration"] = json!({
        "type": "boolean",
        "description": "Include the declaration itself (default true)"
    });

    json!([
        {
            "name": SYMBOL_INFO,
            "description": "Type signature and documentation of the symbol at a file position",
            "inputSchema": position_schema("Path of the file to inspect")
        },
        {
            "name": DEFINITION,
            "description": "Where the symbol at a file position is defined",
            "inputSchema": position_schema("Path of the file containing the symbol")
        },
        {
            "name": REFERENCES,
            "description": "Every usage of the symbol at a file position across the workspace",
            "inputSchema": references
        },
        {
            "name": WORKSPACE_SYMBOLS,
            "description": "Search symbols by name across the workspace",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Symbol name or fragment"}
                },
                "required": ["query"]
            }
        },
        {
            "name": DIAGNOSTICS,
            "description": "Compiler errors and warnings for a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path of the file to check"}
                },
                "required": ["file_path"]
            }
        }
    ])
}
