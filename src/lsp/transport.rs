//! JSON-RPC transport over the language server's pipes.
//!
//! Outbound frames go through a single async-locked writer. One reader task
//! owns the inbound stream and routes every frame: replies to the pending
//! request with the same id, notifications to subscribed handlers, and
//! server-initiated requests to an immediate neutral reply.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::lsp::codec::{FrameReader, FrameWriter};
use crate::lsp::protocol::{method, LogMessageParams};
use crate::utils::error::{BridgeError, Result};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Reply = Result<Value>;

/// Callback run on the reader task for each matching notification.
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback run once when the connection closes, with the reason.
pub type CloseHandler = Box<dyn Fn(&CloseReason) + Send + Sync>;

/// Why the connection stopped accepting traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ProcessExited(String),
    Framing(String),
    Shutdown,
}

impl CloseReason {
    fn to_error(&self) -> BridgeError {
        match self {
            Self::ProcessExited(status) => BridgeError::ProcessExited { status: status.clone() },
            Self::Framing(message) => BridgeError::framing(message.clone()),
            Self::Shutdown => BridgeError::ConnectionClosed,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessExited(status) => write!(f, "process exited ({status})"),
            Self::Framing(message) => write!(f, "framing error ({message})"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

#[derive(Default)]
struct Correlation {
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    closed: Option<CloseReason>,
}

struct Shared {
    writer: tokio::sync::Mutex<FrameWriter<BoxedWriter>>,
    correlation: Mutex<Correlation>,
    handlers: Mutex<HashMap<String, Vec<NotificationHandler>>>,
    close_handlers: Mutex<Vec<CloseHandler>>,
    /// Set once `exit` is about to be sent; a later EOF is then expected.
    exiting: AtomicBool,
    /// How long an unexpected EOF waits for the exit status to arrive.
    eof_grace: Mutex<Option<Duration>>,
}

impl Shared {
    /// A broken pipe means the server is gone; the connection closes with it.
    async fn write(&self, frame: &Value) -> Result<()> {
        let written = self.writer.lock().await.write_frame(frame).await;
        match written {
            Err(BridgeError::Io(e)) => {
                tracing::warn!("Writing to LSP server stdin failed: {e}");
                let reason = CloseReason::ProcessExited(format!("stdin write failed: {e}"));
                self.connection_lost(reason.clone());
                Err(reason.to_error())
            }
            other => other,
        }
    }

    fn close(&self, reason: CloseReason) {
        let drained: Vec<_> = {
            let mut correlation = self.correlation.lock().expect("correlation mutex poisoned");
            if correlation.closed.is_some() {
                return;
            }
            tracing::debug!(
                "Closing LSP transport: {reason} ({} pending request(s))",
                correlation.pending.len()
            );
            correlation.closed = Some(reason.clone());
            correlation.pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(reason.to_error()));
        }
        for handler in self.close_handlers.lock().expect("close handlers mutex poisoned").iter() {
            handler(&reason);
        }
    }

    fn connection_lost(&self, reason: CloseReason) {
        if self.exiting.load(Ordering::SeqCst) {
            self.close(CloseReason::Shutdown);
        } else {
            self.close(reason);
        }
    }

    fn resolve(&self, id: u64, reply: Reply) {
        let sender =
            self.correlation.lock().expect("correlation mutex poisoned").pending.remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::debug!("Dropping reply for unknown request id {id}"),
        }
    }

    fn dispatch_notification(&self, method_name: &str, params: Value) {
        let handlers = self
            .handlers
            .lock()
            .expect("handlers mutex poisoned")
            .get(method_name)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            log_unhandled_notification(method_name, &params);
            return;
        }
        for handler in handlers {
            handler(params.clone());
        }
    }
}

pub struct Transport {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader_handle: JoinHandle<()>,
}

impl Transport {
    /// Wrap a pair of streams and start the reader task.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(FrameWriter::new(writer)),
            correlation: Mutex::new(Correlation::default()),
            handlers: Mutex::new(HashMap::new()),
            close_handlers: Mutex::new(Vec::new()),
            exiting: AtomicBool::new(false),
            eof_grace: Mutex::new(None),
        });

        let reader_shared = Arc::clone(&shared);
        let reader_handle = tokio::spawn(async move {
            read_loop(FrameReader::new(reader), reader_shared).await;
        });

        Self { shared, next_id: AtomicU64::new(1), reader_handle }
    }

    /// Send a request and wait for the reply with the same id.
    ///
    /// With a `timeout`, the caller gives up locally after that long; the
    /// server is not told and may still be working on it.
    pub async fn send_request(
        &self,
        method_name: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut correlation = self.shared.correlation.lock().expect("correlation mutex poisoned");
            if correlation.closed.is_some() {
                return Err(BridgeError::ConnectionClosed);
            }
            correlation.pending.insert(id, tx);
        }

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method_name,
            "params": params,
        });
        tracing::debug!("Sending LSP request: {method_name} (id: {id})");
        if let Err(e) = self.shared.write(&frame).await {
            self.forget(id);
            return Err(e);
        }

        let reply = match timeout {
            Some(limit) => {
                if let Ok(reply) = tokio::time::timeout(limit, rx).await {
                    reply
                } else {
                    self.forget(id);
                    tracing::debug!("LSP request {method_name} (id: {id}) timed out locally");
                    return Err(BridgeError::RequestTimeout {
                        method: method_name.to_string(),
                        after: limit,
                    });
                }
            }
            None => rx.await,
        };

        match reply {
            Ok(Ok(value)) => {
                tracing::debug!("LSP response received for {method_name} (id: {id})");
                Ok(value)
            }
            Ok(Err(e)) => {
                tracing::debug!("LSP request {method_name} (id: {id}) failed: {e}");
                Err(e)
            }
            Err(_) => Err(BridgeError::ConnectionClosed),
        }
    }

    pub async fn send_notification(&self, method_name: &str, params: Value) -> Result<()> {
        self.ensure_open()?;
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method_name,
            "params": params,
        });
        tracing::debug!("Sending LSP notification: {method_name}");
        self.shared.write(&frame).await
    }

    /// Register a handler for an inbound notification method.
    pub fn on_notification<F>(&self, method_name: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .lock()
            .expect("handlers mutex poisoned")
            .entry(method_name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register a handler for the connection closing. Runs at most once; a
    /// handler added after the close does not run.
    pub fn on_close<F>(&self, handler: F)
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        self.shared
            .close_handlers
            .lock()
            .expect("close handlers mutex poisoned")
            .push(Box::new(handler));
    }

    /// Delay the close on an unexpected EOF so an exit observer can report
    /// the real exit status first.
    pub fn set_eof_grace(&self, grace: Duration) {
        *self.shared.eof_grace.lock().expect("eof grace mutex poisoned") = Some(grace);
    }

    /// Mark the coming EOF as expected (the `exit` notification is next).
    pub fn begin_exit(&self) {
        self.shared.exiting.store(true, Ordering::SeqCst);
    }

    /// Report that the peer went away, e.g. from the process exit observer.
    pub fn connection_lost(&self, reason: CloseReason) {
        self.shared.connection_lost(reason);
    }

    /// Stop the connection and fail every pending request.
    pub fn close(&self, reason: CloseReason) {
        self.shared.close(reason);
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.correlation.lock().expect("correlation mutex poisoned").closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason().is_some()
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.shared.correlation.lock().expect("correlation mutex poisoned").pending.len()
    }

    /// Once closed, new traffic is refused with `ConnectionClosed`; the
    /// original cause was already delivered to the requests that were pending.
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::ConnectionClosed);
        }
        Ok(())
    }

    fn forget(&self, id: u64) {
        self.shared.correlation.lock().expect("correlation mutex poisoned").pending.remove(&id);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

enum Incoming {
    Reply { id: u64, reply: Reply },
    ServerRequest { id: Value, method: String, params: Value },
    Notification { method: String, params: Value },
}

fn classify(frame: Value) -> Option<Incoming> {
    let Value::Object(mut object) = frame else {
        return None;
    };
    let id = object.remove("id");
    let method_name = object.get("method").and_then(Value::as_str).map(String::from);

    match (id, method_name) {
        (Some(id), Some(method)) => Some(Incoming::ServerRequest {
            id,
            method,
            params: object.remove("params").unwrap_or(Value::Null),
        }),
        (None, Some(method)) => Some(Incoming::Notification {
            method,
            params: object.remove("params").unwrap_or(Value::Null),
        }),
        (Some(id), None) => {
            let id = id.as_u64()?;
            let reply = match object.remove("error") {
                Some(error) if !error.is_null() => Err(BridgeError::Remote {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                }),
                _ => Ok(object.remove("result").unwrap_or(Value::Null)),
            };
            Some(Incoming::Reply { id, reply })
        }
        (None, None) => None,
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: FrameReader<R>, shared: Arc<Shared>) {
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => match classify(frame) {
                Some(Incoming::Reply { id, reply }) => shared.resolve(id, reply),
                Some(Incoming::Notification { method, params }) => {
                    shared.dispatch_notification(&method, params);
                }
                Some(Incoming::ServerRequest { id, method, params }) => {
                    answer_server_request(&shared, id, &method, &params).await;
                }
                None => tracing::warn!("Ignoring LSP frame that is neither reply nor message"),
            },
            Ok(None) => {
                tracing::debug!("LSP server stdout closed (EOF)");
                let grace = *shared.eof_grace.lock().expect("eof grace mutex poisoned");
                if let Some(grace) = grace.filter(|_| !shared.exiting.load(Ordering::SeqCst)) {
                    tokio::time::sleep(grace).await;
                }
                shared.connection_lost(CloseReason::ProcessExited(
                    "stdout closed".to_string(),
                ));
                break;
            }
            Err(e) => {
                tracing::warn!("Fatal LSP framing error: {e}");
                let message = match e {
                    BridgeError::ProtocolFraming { message } => message,
                    other => other.to_string(),
                };
                shared.close(CloseReason::Framing(message));
                break;
            }
        }
    }
}

async fn answer_server_request(shared: &Shared, id: Value, method_name: &str, params: &Value) {
    tracing::debug!("Answering server request {method_name} (id: {id})");
    let result = if method_name == method::WORKSPACE_CONFIGURATION {
        let items = params.get("items").and_then(Value::as_array).map_or(0, Vec::len);
        Value::Array(vec![Value::Null; items])
    } else {
        Value::Null
    };
    let frame = json!({"jsonrpc": "2.0", "id": id, "result": result});
    if let Err(e) = shared.write(&frame).await {
        tracing::debug!("Failed to answer server request {method_name}: {e}");
    }
}

fn log_unhandled_notification(method_name: &str, params: &Value) {
    if method_name == method::LOG_MESSAGE || method_name == method::SHOW_MESSAGE {
        if let Ok(log) = serde_json::from_value::<LogMessageParams>(params.clone()) {
            match log.kind {
                1 => tracing::error!(target: "lsp_bridge::server_log", "{}", log.message),
                2 => tracing::warn!(target: "lsp_bridge::server_log", "{}", log.message),
                3 => tracing::info!(target: "lsp_bridge::server_log", "{}", log.message),
                _ => tracing::debug!(target: "lsp_bridge::server_log", "{}", log.message),
            }
            return;
        }
    }
    tracing::trace!("Unhandled LSP notification: {method_name}");
}
