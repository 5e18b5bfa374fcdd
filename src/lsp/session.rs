//! One language-server session: handshake, gating, document sync, shutdown.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::lsp::diagnostics::DiagnosticsCache;
use crate::lsp::documents::{DocumentTracker, SyncNotification};
use crate::lsp::process::{LspProcess, ServerCommand};
use crate::lsp::protocol::{method, InitializeParams, InitializeResult};
use crate::lsp::transport::{CloseReason, Transport};
use crate::utils::error::{BridgeError, Result};

/// How long `shutdown` waits for the server to acknowledge.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long a stdout EOF waits for the child's exit status.
const EXIT_STATUS_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unstarted,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unstarted => "unstarted",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What `open_document` did on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Opened { version: i32 },
    Changed { version: i32 },
    Unchanged { version: i32 },
}

impl SyncOutcome {
    /// Whether a notification was sent, so fresh diagnostics may follow.
    pub fn notified(self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    pub fn version(self) -> i32 {
        match self {
            Self::Opened { version } | Self::Changed { version } | Self::Unchanged { version } => {
                version
            }
        }
    }
}

/// Capabilities advertised in `initialize`.
pub fn client_capabilities() -> Value {
    serde_json::json!({
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": false,
                "didSave": false
            },
            "hover": {
                "dynamicRegistration": false,
                "contentFormat": ["markdown", "plaintext"]
            },
            "definition": {
                "dynamicRegistration": false,
                "linkSupport": true
            },
            "references": {
                "dynamicRegistration": false
            },
            "publishDiagnostics": {
                "relatedInformation": false,
                "versionSupport": true
            }
        },
        "workspace": {
            "symbol": {
                "dynamicRegistration": false
            },
            "configuration": true
        },
        "window": {
            "workDoneProgress": true
        }
    })
}

pub struct Session {
    transport: Arc<Transport>,
    process: Option<Arc<LspProcess>>,
    state: Mutex<ConnectionState>,
    /// Held across the write so versions reach the wire in order.
    documents: tokio::sync::Mutex<DocumentTracker>,
    diagnostics: DiagnosticsCache,
    server: Mutex<Option<InitializeResult>>,
    request_timeout: Option<Duration>,
}

impl Session {
    /// Launch the language server and wire its pipes to a new session.
    ///
    /// The session starts in `Unstarted`; call [`Session::initialize`] next.
    pub fn start(working_dir: &Path, command: &ServerCommand) -> Result<Self> {
        let (process, io) = LspProcess::start(working_dir, command)?;
        let process = Arc::new(process);
        let transport = Arc::new(Transport::new(io.stdout, io.stdin));
        transport.set_eof_grace(EXIT_STATUS_GRACE);

        let observer = Arc::downgrade(&transport);
        process.watch_exit(move |status| {
            if let Some(transport) = observer.upgrade() {
                transport.connection_lost(CloseReason::ProcessExited(status.to_string()));
            }
        });

        // A connection that died for any other reason leaves nothing to talk to.
        let supervised = Arc::downgrade(&process);
        transport.on_close(move |reason| {
            if *reason == CloseReason::Shutdown {
                return;
            }
            if let Some(process) = supervised.upgrade() {
                tracing::debug!(
                    "Stopping language server (pid: {:?}) after {reason}",
                    process.pid()
                );
                process.terminate();
            }
        });

        Ok(Self::assemble(transport, Some(process)))
    }

    /// A session over an already-connected transport with no child process.
    pub fn from_transport(transport: Transport) -> Self {
        Self::assemble(Arc::new(transport), None)
    }

    fn assemble(transport: Arc<Transport>, process: Option<Arc<LspProcess>>) -> Self {
        let diagnostics = DiagnosticsCache::subscribe(&transport);
        Self {
            transport,
            process,
            state: Mutex::new(ConnectionState::Unstarted),
            documents: tokio::sync::Mutex::new(DocumentTracker::new()),
            diagnostics,
            server: Mutex::new(None),
            request_timeout: None,
        }
    }

    /// Local deadline applied to every query; `None` waits indefinitely.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        if self.transport.is_closed() {
            return ConnectionState::Terminated;
        }
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    pub async fn initialize(
        &self,
        root_uri: &str,
        capabilities: Value,
        initialization_options: Option<Value>,
    ) -> Result<InitializeResult> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if self.transport.is_closed() || *state == ConnectionState::Terminated {
                return Err(BridgeError::ConnectionClosed);
            }
            if *state != ConnectionState::Unstarted {
                return Err(BridgeError::Handshake {
                    message: format!("initialize is only allowed once (state: {})", *state),
                });
            }
            *state = ConnectionState::Initializing;
        }

        let params = InitializeParams {
            process_id: std::process::id(),
            root_uri: root_uri.to_string(),
            capabilities,
            initialization_options,
        };

        match self.handshake(params).await {
            Ok(result) => {
                self.set_state(ConnectionState::Ready);
                Ok(result)
            }
            Err(e) => {
                self.set_state(ConnectionState::Unstarted);
                tracing::warn!("LSP initialize failed: {e}");
                Err(BridgeError::Handshake { message: e.to_string() })
            }
        }
    }

    async fn handshake(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::debug!("Sending LSP initialize request for {}", params.root_uri);
        let reply = self
            .transport
            .send_request(method::INITIALIZE, serde_json::to_value(params)?, self.request_timeout)
            .await?;

        let result: InitializeResult = serde_json::from_value(reply).unwrap_or_default();
        match &result.server_info {
            Some(info) => tracing::info!(
                "Connected to {} {}",
                info.name,
                info.version.as_deref().unwrap_or("(unknown version)")
            ),
            None => tracing::info!("Connected to language server"),
        }

        self.transport.send_notification(method::INITIALIZED, serde_json::json!({})).await?;
        *self.server.lock().expect("server mutex poisoned") = Some(result.clone());
        Ok(result)
    }

    /// What the server reported about itself during the handshake.
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.server.lock().expect("server mutex poisoned").clone()
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Terminated => Err(BridgeError::ConnectionClosed),
            state => Err(BridgeError::NotReady { state }),
        }
    }

    pub async fn request(&self, method_name: &str, params: Value) -> Result<Value> {
        self.ensure_ready()?;
        self.transport.send_request(method_name, params, self.request_timeout).await
    }

    pub async fn notify(&self, method_name: &str, params: Value) -> Result<()> {
        self.ensure_ready()?;
        self.transport.send_notification(method_name, params).await
    }

    /// Make sure the server sees `text` as the content of `uri`.
    pub async fn open_document(
        &self,
        uri: &str,
        language_id: &str,
        text: String,
    ) -> Result<SyncOutcome> {
        self.ensure_ready()?;
        let mut documents = self.documents.lock().await;

        let Some(notification) = documents.open(uri, language_id, text) else {
            let version = documents.current_version(uri).unwrap_or(1);
            tracing::debug!("open_document: {uri} unchanged at version {version}");
            return Ok(SyncOutcome::Unchanged { version });
        };

        let outcome = match &notification {
            SyncNotification::Change(params) => {
                SyncOutcome::Changed { version: params.text_document.version }
            }
            _ => SyncOutcome::Opened { version: 1 },
        };
        self.transport.send_notification(notification.method(), notification.params()?).await?;
        tracing::debug!("open_document: {uri} -> {outcome:?}");
        Ok(outcome)
    }

    pub async fn close_document(&self, uri: &str) -> Result<()> {
        self.ensure_ready()?;
        let mut documents = self.documents.lock().await;
        let notification = documents.close(uri);
        self.transport.send_notification(notification.method(), notification.params()?).await
    }

    pub async fn document_version(&self, uri: &str) -> Option<i32> {
        self.documents.lock().await.current_version(uri)
    }

    pub async fn open_documents(&self) -> Vec<String> {
        self.documents.lock().await.open_documents()
    }

    pub fn diagnostics(&self) -> &DiagnosticsCache {
        &self.diagnostics
    }

    pub fn process(&self) -> Option<&LspProcess> {
        self.process.as_deref()
    }

    /// Orderly teardown: `shutdown`, `exit`, then kill the process.
    ///
    /// Every request still pending fails with `ConnectionClosed`. On a
    /// connection that is already gone the process is still stopped.
    pub async fn shutdown(&self) -> Result<()> {
        let already_closed = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if self.transport.is_closed() || *state == ConnectionState::Terminated {
                *state = ConnectionState::Terminated;
                true
            } else if *state != ConnectionState::Ready {
                return Err(BridgeError::NotReady { state: *state });
            } else {
                *state = ConnectionState::ShuttingDown;
                false
            }
        };
        if already_closed {
            if let Some(process) = &self.process {
                process.terminate();
            }
            return Err(BridgeError::ConnectionClosed);
        }
        tracing::debug!("Shutting down LSP session");

        if let Err(e) =
            self.transport.send_request(method::SHUTDOWN, Value::Null, Some(SHUTDOWN_GRACE)).await
        {
            tracing::warn!("LSP shutdown request failed: {e}");
        }

        self.transport.begin_exit();
        if let Err(e) = self.transport.send_notification(method::EXIT, Value::Null).await {
            tracing::debug!("LSP exit notification failed: {e}");
        }

        self.transport.close(CloseReason::Shutdown);
        if let Some(process) = &self.process {
            process.terminate();
        }
        self.set_state(ConnectionState::Terminated);
        tracing::info!(
            "LSP session terminated (pid: {:?})",
            self.process().and_then(LspProcess::pid)
        );
        Ok(())
    }
}
