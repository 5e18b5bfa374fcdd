//! In-memory language server double for unit tests.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

use crate::lsp::codec::{FrameReader, FrameWriter};
use crate::lsp::session::Session;
use crate::lsp::transport::Transport;

const PIPE_CAPACITY: usize = 1 << 16;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeServer {
    incoming: FrameReader<DuplexStream>,
    outgoing: DuplexStream,
}

impl FakeServer {
    pub fn transport() -> (Transport, Self) {
        let (client_out, server_in) = duplex(PIPE_CAPACITY);
        let (server_out, client_in) = duplex(PIPE_CAPACITY);
        let transport = Transport::new(client_in, client_out);
        (transport, Self { incoming: FrameReader::new(server_in), outgoing: server_out })
    }

    /// A session that has not been initialized yet.
    pub fn session() -> (Session, Self) {
        let (transport, server) = Self::transport();
        (Session::from_transport(transport), server)
    }

    /// A session that completed the handshake.
    pub async fn ready_session() -> (Session, Self) {
        let (session, mut server) = Self::session();
        let (result, ()) = tokio::join!(
            session.initialize("file:///workspace", json!({}), None),
            server.complete_handshake(),
        );
        result.expect("handshake should succeed");
        (session, server)
    }

    pub async fn complete_handshake(&mut self) {
        let request = self.expect("initialize").await;
        self.respond(&request["id"], json!({"capabilities": {}, "serverInfo": {"name": "fake"}}))
            .await;
        self.expect("initialized").await;
    }

    /// Next frame written by the client.
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.incoming.read_frame())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client frame should be well formed")
            .expect("client closed the pipe")
    }

    pub async fn expect(&mut self, method: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["method"], method, "unexpected frame: {frame}");
        frame
    }

    /// Whether the client writes nothing for a short while.
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(100), self.incoming.read_frame()).await.is_err()
    }

    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "result": result})).await;
    }

    pub async fn respond_error(&mut self, id: &Value, code: i64, message: &str) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({"jsonrpc": "2.0", "method": method, "params": params})).await;
    }

    pub async fn send(&mut self, message: &Value) {
        FrameWriter::new(&mut self.outgoing).write_frame(message).await.expect("write frame");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.outgoing.write_all(bytes).await.expect("write raw bytes");
    }

    /// Stop reading what the client writes while keeping the reply pipe open.
    pub fn into_outgoing(self) -> DuplexStream {
        self.outgoing
    }
}
