use std::fmt;
use std::path::Path;

use url::Url;

use crate::lsp::protocol::Position;
use crate::utils::error::{BridgeError, Result};

/// A caller-facing location: filesystem path with 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePosition {
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl FilePosition {
    pub fn new(path: &str, line: u32, column: u32) -> Result<Self> {
        validate_path(path)?;
        if line < 1 {
            return Err(BridgeError::validation(format!("line must be at least 1 (got {line})")));
        }
        if column < 1 {
            return Err(BridgeError::validation(format!(
                "column must be at least 1 (got {column})"
            )));
        }
        Ok(Self { path: path.to_string(), line, column })
    }

    /// The same spot in the server's 0-based coordinates.
    pub fn to_lsp(&self) -> Position {
        Position { line: self.line - 1, character: self.column - 1 }
    }
}

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

pub fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(BridgeError::validation("file path must not be empty"));
    }
    Ok(())
}

pub fn validate_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(BridgeError::validation("query must not be empty"));
    }
    Ok(query)
}

/// 0-based server position to 1-based `(line, column)`.
pub fn to_one_based(position: Position) -> (u32, u32) {
    (position.line.saturating_add(1), position.character.saturating_add(1))
}

/// `file://` URI for an absolute path.
pub fn file_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| BridgeError::validation(format!("not an absolute path: {}", path.display())))
}

/// Filesystem path for a `file://` URI, or the URI itself for anything else.
pub fn display_path(uri: &str) -> String {
    Url::parse(uri)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .map_or_else(|| uri.to_string(), |path| path.display().to_string())
}

pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("c" | "h") => "c",
        Some("cc" | "cpp" | "cxx" | "hh" | "hpp" | "hxx") => "cpp",
        Some("m") => "objective-c",
        Some("mm") => "objective-cpp",
        _ => "swift",
    }
}
