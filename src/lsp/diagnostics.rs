//! Diagnostics cache fed by `textDocument/publishDiagnostics`.
//!
//! Every publish replaces the whole set for its URI. A URI that never got a
//! publish reads as empty, which is indistinguishable from a clean file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::lsp::protocol::{method, Diagnostic, PublishDiagnosticsParams};
use crate::lsp::transport::Transport;

struct Entry {
    generation: u64,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    updated: Notify,
}

#[derive(Clone, Default)]
pub struct DiagnosticsCache {
    inner: Arc<Inner>,
}

impl DiagnosticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that is fed by `transport`'s push notifications.
    pub fn subscribe(transport: &Transport) -> Self {
        let cache = Self::new();
        let sink = cache.clone();
        transport.on_notification(method::PUBLISH_DIAGNOSTICS, move |params| {
            match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                Ok(params) => sink.store(params),
                Err(e) => tracing::warn!("Ignoring malformed publishDiagnostics: {e}"),
            }
        });
        cache
    }

    pub fn store(&self, params: PublishDiagnosticsParams) {
        tracing::debug!(
            "Diagnostics for {}: {} item(s)",
            params.uri,
            params.diagnostics.len()
        );
        {
            let mut entries = self.inner.entries.lock().expect("diagnostics mutex poisoned");
            let entry = entries
                .entry(params.uri)
                .or_insert_with(|| Entry { generation: 0, diagnostics: Vec::new() });
            entry.generation += 1;
            entry.diagnostics = params.diagnostics;
        }
        self.inner.updated.notify_waiters();
    }

    pub fn get(&self, uri: &str) -> Vec<Diagnostic> {
        self.inner
            .entries
            .lock()
            .expect("diagnostics mutex poisoned")
            .get(uri)
            .map(|entry| entry.diagnostics.clone())
            .unwrap_or_default()
    }

    /// Number of publishes seen for `uri` (0 if none).
    pub fn generation(&self, uri: &str) -> u64 {
        self.inner
            .entries
            .lock()
            .expect("diagnostics mutex poisoned")
            .get(uri)
            .map_or(0, |entry| entry.generation)
    }

    /// Wait until `uri` has been published past generation `since`, or
    /// until `limit` elapses. Returns whether a newer set arrived.
    pub async fn wait_for_update(&self, uri: &str, since: u64, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let notified = self.inner.updated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.generation(uri) > since {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.generation(uri) > since;
            }
        }
    }

    #[cfg(test)]
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .inner
            .entries
            .lock()
            .expect("diagnostics mutex poisoned")
            .keys()
            .cloned()
            .collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().expect("diagnostics mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
