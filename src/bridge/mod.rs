//! Tool-facing operations over a language server session.
//!
//! Every operation takes caller coordinates (path, 1-based line/column),
//! synchronizes the document, issues one request and renders the answer.
//! Failures never escape: they come back as text with an [`ErrorTag`].

pub mod position;
pub mod render;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::lsp::protocol::{
    method, DefinitionResponse, Hover, Location, ReferenceContext, ReferenceParams,
    SymbolInformation, TextDocumentIdentifier, TextDocumentPositionParams, WorkspaceSymbolParams,
};
use crate::lsp::session::{Session, SyncOutcome};
use crate::utils::error::{BridgeError, ErrorTag, Result};
use position::{file_uri, language_id_for, validate_path, validate_query, FilePosition};

/// Default wait for fresh diagnostics after a document is opened or changed.
pub const DEFAULT_DIAGNOSTICS_SETTLE: Duration = Duration::from_millis(2000);

/// Rendered result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
}

impl ToolResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), error: None }
    }

    pub fn failure(error: &BridgeError) -> Self {
        Self { text: format!("Error: {error}"), error: Some(error.tag()) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn from_result(operation: &str, result: Result<String>) -> Self {
        match result {
            Ok(text) => Self::success(text),
            Err(e) => {
                tracing::debug!("{operation} failed: {e}");
                Self::failure(&e)
            }
        }
    }
}

struct SyncedDocument {
    path: PathBuf,
    uri: String,
    outcome: SyncOutcome,
}

pub struct Bridge {
    session: Arc<Session>,
    diagnostics_settle: Duration,
}

impl Bridge {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session, diagnostics_settle: DEFAULT_DIAGNOSTICS_SETTLE }
    }

    #[must_use]
    pub fn with_diagnostics_settle(mut self, settle: Duration) -> Self {
        self.diagnostics_settle = settle;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Type and documentation of the symbol under the cursor (`textDocument/hover`).
    pub async fn symbol_info(&self, file_path: &str, line: u32, column: u32) -> ToolResponse {
        ToolResponse::from_result("symbol_info", self.try_symbol_info(file_path, line, column).await)
    }

    async fn try_symbol_info(&self, file_path: &str, line: u32, column: u32) -> Result<String> {
        let target = FilePosition::new(file_path, line, column)?;
        let document = self.sync(&target.path).await?;
        let params = position_params(&document, &target);

        let reply = self.session.request(method::HOVER, serde_json::to_value(params)?).await?;
        let hover: Option<Hover> = serde_json::from_value(reply)?;
        Ok(render::hover(hover.as_ref(), &target))
    }

    pub async fn definition(&self, file_path: &str, line: u32, column: u32) -> ToolResponse {
        ToolResponse::from_result("definition", self.try_definition(file_path, line, column).await)
    }

    async fn try_definition(&self, file_path: &str, line: u32, column: u32) -> Result<String> {
        let target = FilePosition::new(file_path, line, column)?;
        let document = self.sync(&target.path).await?;
        let params = position_params(&document, &target);

        let reply = self.session.request(method::DEFINITION, serde_json::to_value(params)?).await?;
        let locations = serde_json::from_value::<Option<DefinitionResponse>>(reply)?
            .map(DefinitionResponse::into_locations)
            .unwrap_or_default();
        Ok(render::definitions(&locations, &target))
    }

    /// All usages of the symbol under the cursor. `include_declaration`
    /// defaults to true.
    pub async fn references(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
        include_declaration: Option<bool>,
    ) -> ToolResponse {
        ToolResponse::from_result(
            "references",
            self.try_references(file_path, line, column, include_declaration.unwrap_or(true)).await,
        )
    }

    async fn try_references(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
        include_declaration: bool,
    ) -> Result<String> {
        let target = FilePosition::new(file_path, line, column)?;
        let document = self.sync(&target.path).await?;
        let params = ReferenceParams {
            text_document_position_params: position_params(&document, &target),
            context: ReferenceContext { include_declaration },
        };

        let reply = self.session.request(method::REFERENCES, serde_json::to_value(params)?).await?;
        let locations: Vec<Location> =
            serde_json::from_value::<Option<Vec<Location>>>(reply)?.unwrap_or_default();
        Ok(render::references(&locations, &target))
    }

    pub async fn workspace_symbols(&self, query: &str) -> ToolResponse {
        ToolResponse::from_result("workspace_symbols", self.try_workspace_symbols(query).await)
    }

    async fn try_workspace_symbols(&self, query: &str) -> Result<String> {
        let query = validate_query(query)?;
        let params = WorkspaceSymbolParams { query: query.to_string() };

        let reply =
            self.session.request(method::WORKSPACE_SYMBOL, serde_json::to_value(params)?).await?;
        let symbols: Vec<SymbolInformation> =
            serde_json::from_value::<Option<Vec<SymbolInformation>>>(reply)?.unwrap_or_default();
        Ok(render::workspace_symbols(&symbols, query))
    }

    /// Latest published diagnostics for a file.
    ///
    /// If this call had to open or update the document, waits up to the
    /// settle delay for the server to publish before reading the cache.
    pub async fn diagnostics(&self, file_path: &str) -> ToolResponse {
        ToolResponse::from_result("diagnostics", self.try_diagnostics(file_path).await)
    }

    async fn try_diagnostics(&self, file_path: &str) -> Result<String> {
        validate_path(file_path)?;
        let (path, uri, text) = read_document(file_path).await?;
        let cache = self.session.diagnostics();
        let since = cache.generation(&uri);

        let outcome = self.session.open_document(&uri, language_id_for(&path), text).await?;
        if outcome.notified() {
            let arrived = cache.wait_for_update(&uri, since, self.diagnostics_settle).await;
            tracing::debug!(
                "Diagnostics for {uri} after settle: arrived={arrived} ({} uri(s) cached)",
                cache.len()
            );
        }

        Ok(render::diagnostics(&cache.get(&uri), file_path))
    }

    async fn sync(&self, file_path: &str) -> Result<SyncedDocument> {
        let (path, uri, text) = read_document(file_path).await?;
        let outcome = self.session.open_document(&uri, language_id_for(&path), text).await?;
        Ok(SyncedDocument { path, uri, outcome })
    }
}

fn position_params(document: &SyncedDocument, target: &FilePosition) -> TextDocumentPositionParams {
    tracing::debug!(
        "{} (version {}) at {:?}",
        document.path.display(),
        document.outcome.version(),
        target.to_lsp()
    );
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: document.uri.clone() },
        position: target.to_lsp(),
    }
}

/// Canonical path, `file://` URI and current content of a file on disk.
async fn read_document(file_path: &str) -> Result<(PathBuf, String, String)> {
    let not_found = || BridgeError::FileNotFound { path: file_path.to_string() };

    let path = match tokio::fs::canonicalize(Path::new(file_path)).await {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    if !tokio::fs::metadata(&path).await?.is_file() {
        return Err(BridgeError::validation(format!("not a regular file: {file_path}")));
    }

    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(BridgeError::validation(format!("file is not valid UTF-8: {file_path}")));
        }
        Err(e) => return Err(e.into()),
    };

    let uri = file_uri(&path)?;
    Ok((path, uri, text))
}

/// Parse a raw tool argument object; used by callers that only have JSON.
pub fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| BridgeError::validation(e.to_string()))
}
