//! Bridge between MCP tool calls and a Language Server Protocol server.
//!
//! [`lsp`] supervises the server process and speaks LSP over its pipes,
//! [`bridge`] turns tool arguments into LSP queries and renders the replies,
//! and [`mcp`] serves those tools to an agent over stdio.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod lsp;
pub mod mcp;
pub mod utils;
