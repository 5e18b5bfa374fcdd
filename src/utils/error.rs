use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::lsp::session::ConnectionState;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to launch language server '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("language server terminated unexpectedly ({status})")]
    ProcessExited { status: String },

    #[error("malformed message from language server: {message}")]
    ProtocolFraming { message: String },

    #[error("initialize handshake failed: {message}")]
    Handshake { message: String },

    #[error("language server connection is not ready (state: {state})")]
    NotReady { state: ConnectionState },

    #[error("language server connection is closed")]
    ConnectionClosed,

    #[error("language server returned error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("request '{method}' timed out after {}ms", after.as_millis())]
    RequestTimeout { method: String, after: Duration },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid arguments: {message}")]
    Validation { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn framing(message: impl Into<String>) -> Self {
        Self::ProtocolFraming { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Structured tag reported alongside the rendered text.
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::Spawn { .. } => ErrorTag::Spawn,
            Self::ProcessExited { .. } => ErrorTag::ProcessExited,
            Self::ProtocolFraming { .. } => ErrorTag::ProtocolFraming,
            Self::Handshake { .. } => ErrorTag::Handshake,
            Self::NotReady { .. } => ErrorTag::NotReady,
            Self::ConnectionClosed => ErrorTag::ConnectionClosed,
            Self::Remote { .. } => ErrorTag::Remote,
            Self::RequestTimeout { .. } => ErrorTag::RequestTimeout,
            Self::FileNotFound { .. } => ErrorTag::FileNotFound,
            Self::Validation { .. } => ErrorTag::Validation,
            Self::Io(_) | Self::Json(_) => ErrorTag::Internal,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    Spawn,
    ProcessExited,
    ProtocolFraming,
    Handshake,
    NotReady,
    ConnectionClosed,
    Remote,
    RequestTimeout,
    FileNotFound,
    Validation,
    Internal,
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
