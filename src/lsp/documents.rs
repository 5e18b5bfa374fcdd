use std::collections::HashMap;

use serde_json::Value;

use crate::lsp::protocol::{
    method, DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    VersionedTextDocumentIdentifier,
};
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

/// A document-sync notification the tracker wants on the wire.
#[derive(Debug, Clone)]
pub enum SyncNotification {
    Open(DidOpenTextDocumentParams),
    Change(DidChangeTextDocumentParams),
    Close(DidCloseTextDocumentParams),
}

impl SyncNotification {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Open(_) => method::DID_OPEN,
            Self::Change(_) => method::DID_CHANGE,
            Self::Close(_) => method::DID_CLOSE,
        }
    }

    pub fn params(&self) -> Result<Value> {
        let value = match self {
            Self::Open(params) => serde_json::to_value(params)?,
            Self::Change(params) => serde_json::to_value(params)?,
            Self::Close(params) => serde_json::to_value(params)?,
        };
        Ok(value)
    }
}

/// Open documents and their versions, as last told to the server.
#[derive(Debug, Default)]
pub struct DocumentTracker {
    documents: HashMap<String, OpenDocument>,
}

impl DocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the server's view of `uri` match `text`.
    ///
    /// First open yields `didOpen` at version 1. Identical text yields
    /// nothing. Different text bumps the version by one and yields a
    /// full-text `didChange`.
    pub fn open(&mut self, uri: &str, language_id: &str, text: String) -> Option<SyncNotification> {
        if let Some(document) = self.documents.get_mut(uri) {
            if document.text == text {
                return None;
            }
            document.version += 1;
            document.text.clone_from(&text);
            return Some(SyncNotification::Change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.to_string(),
                    version: document.version,
                },
                content_changes: vec![TextDocumentContentChangeEvent { text }],
            }));
        }

        let document = OpenDocument {
            uri: uri.to_string(),
            language_id: language_id.to_string(),
            version: 1,
            text,
        };
        let notification = SyncNotification::Open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: document.uri.clone(),
                language_id: document.language_id.clone(),
                version: document.version,
                text: document.text.clone(),
            },
        });
        self.documents.insert(uri.to_string(), document);
        Some(notification)
    }

    /// Forget `uri`. Always yields `didClose`, even for unknown documents.
    pub fn close(&mut self, uri: &str) -> SyncNotification {
        self.documents.remove(uri);
        SyncNotification::Close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.to_string() },
        })
    }

    pub fn current_version(&self, uri: &str) -> Option<i32> {
        self.documents.get(uri).map(|document| document.version)
    }

    #[cfg(test)]
    pub fn get(&self, uri: &str) -> Option<&OpenDocument> {
        self.documents.get(uri)
    }

    /// Tracked URIs, sorted.
    pub fn open_documents(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.documents.keys().cloned().collect();
        uris.sort();
        uris
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "file:///project/Sources/main.swift";

    #[test]
    fn test_first_open_is_version_one() {
        let mut tracker = DocumentTracker::new();
        let notification = tracker.open(URI, "swift", "let a = 1".to_string()).unwrap();

        assert_eq!(notification.method(), "textDocument/didOpen");
        let params = notification.params().unwrap();
        assert_eq!(params["textDocument"]["version"], 1);
        assert_eq!(params["textDocument"]["languageId"], "swift");
        assert_eq!(params["textDocument"]["text"], "let a = 1");
        assert_eq!(tracker.current_version(URI), Some(1));
    }

    #[test]
    fn test_reopen_with_identical_content_is_noop() {
        let mut tracker = DocumentTracker::new();
        assert!(tracker.open(URI, "swift", "let a = 1".to_string()).is_some());
        assert!(tracker.open(URI, "swift", "let a = 1".to_string()).is_none());
        assert_eq!(tracker.current_version(URI), Some(1));
    }

    #[test]
    fn test_changed_content_bumps_version_by_one() {
        let mut tracker = DocumentTracker::new();
        tracker.open(URI, "swift", "let a = 1".to_string());

        let notification = tracker.open(URI, "swift", "let a = 2".to_string()).unwrap();
        assert_eq!(notification.method(), "textDocument/didChange");
        let params = notification.params().unwrap();
        assert_eq!(params["textDocument"]["version"], 2);
        assert_eq!(params["contentChanges"][0]["text"], "let a = 2");

        tracker.open(URI, "swift", "let a = 3".to_string());
        assert_eq!(tracker.current_version(URI), Some(3));
        assert_eq!(tracker.get(URI).unwrap().text, "let a = 3");
    }

    #[test]
    fn test_close_removes_entry_and_reopen_restarts_at_one() {
        let mut tracker = DocumentTracker::new();
        tracker.open(URI, "swift", "a".to_string());
        tracker.open(URI, "swift", "b".to_string());

        let notification = tracker.close(URI);
        assert_eq!(notification.method(), "textDocument/didClose");
        assert_eq!(tracker.current_version(URI), None);
        assert!(tracker.is_empty());

        let reopened = tracker.open(URI, "swift", "b".to_string()).unwrap();
        assert_eq!(reopened.method(), "textDocument/didOpen");
        assert_eq!(tracker.current_version(URI), Some(1));
    }

    #[test]
    fn test_close_unknown_document_still_notifies() {
        let mut tracker = DocumentTracker::new();
        let notification = tracker.close("file:///never/opened.swift");
        assert_eq!(notification.params().unwrap()["textDocument"]["uri"], "file:///never/opened.swift");
    }

    #[test]
    fn test_open_documents_sorted() {
        let mut tracker = DocumentTracker::new();
        tracker.open("file:///b.swift", "swift", String::new());
        tracker.open("file:///a.swift", "swift", String::new());
        assert_eq!(tracker.open_documents(), vec!["file:///a.swift", "file:///b.swift"]);
        assert_eq!(tracker.len(), 2);
    }
}
