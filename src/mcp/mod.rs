//! Model Context Protocol front end.
//!
//! Agents talk newline-delimited JSON-RPC on stdio; every tool call is
//! handed to [`crate::bridge::Bridge`] and its rendered text sent back.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::McpServer;
