//! `Content-Length` framing for the language server's stdio pipes.
//!
//! Each message is `Content-Length: N\r\n\r\n` followed by exactly `N` bytes
//! of UTF-8 JSON. [`FrameReader`] buffers partial frames across reads;
//! [`FrameWriter`] emits one frame per call.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::utils::error::{BridgeError, Result};

/// Upper bound on a single frame body (64 MiB).
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: BufReader::new(reader) }
    }

    /// Read the next frame body as JSON.
    ///
    /// Returns `Ok(None)` on EOF between frames. Anything else that is not a
    /// complete, well-formed frame is a [`BridgeError::ProtocolFraming`].
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(BridgeError::framing(format!(
                "Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}"
            )));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await.map_err(|e| {
            BridgeError::framing(format!("truncated body (expected {content_length} bytes): {e}"))
        })?;

        let value = serde_json::from_slice(&body)
            .map_err(|e| BridgeError::framing(format!("body is not valid JSON: {e}")))?;
        Ok(Some(value))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| BridgeError::framing(format!("reading header line: {e}")))?;

            if bytes_read == 0 {
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(BridgeError::framing("unexpected EOF while reading headers"));
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(BridgeError::framing(format!("malformed header line: {trimmed:?}")));
            };
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let len = value.trim().parse::<usize>().map_err(|_| {
                    BridgeError::framing(format!("invalid Content-Length value: {:?}", value.trim()))
                })?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| BridgeError::framing("missing Content-Length header"))
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, message: &Value) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_multiple_frames_in_one_buffer() {
        let first = json!({"jsonrpc": "2.0", "id": 1});
        let second = json!({"jsonrpc": "2.0", "method": "initialized", "params": {}});

        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer.write_frame(&first).await.unwrap();
        writer.write_frame(&second).await.unwrap();

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), first);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), second);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let body = r#"{"jsonrpc":"2.0","id":7,"result":null}"#;
        let frame = format!("Content-Length: {}\r\n\r\n{body}", body.len());
        let (head, tail) = frame.as_bytes().split_at(10);

        let (mut tx, rx) = tokio::io::duplex(64);
        let head = head.to_vec();
        let tail = tail.to_vec();
        tokio::spawn(async move {
            tx.write_all(&head).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.write_all(&tail).await.unwrap();
        });

        let mut reader = FrameReader::new(rx);
        let value = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn test_missing_content_length_is_framing_error() {
        let buf: &[u8] = b"Content-Type: application/json\r\n\r\n{}";
        let mut reader = FrameReader::new(buf);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolFraming { .. }));
    }

    #[tokio::test]
    async fn test_invalid_content_length_value() {
        let buf: &[u8] = b"Content-Length: twelve\r\n\r\n";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            BridgeError::ProtocolFraming { .. }
        ));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let buf: &[u8] = b"Content-Length: 100\r\n\r\nhello";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            BridgeError::ProtocolFraming { .. }
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_headers() {
        let buf: &[u8] = b"Content-Length: 10\r\n";
        let mut reader = FrameReader::new(buf);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let body = "not json";
        let frame = format!("Content-Length: {}\r\n\r\n{body}", body.len());
        let mut reader = FrameReader::new(frame.as_bytes());
        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            BridgeError::ProtocolFraming { .. }
        ));
    }

    #[tokio::test]
    async fn test_extra_headers_and_case() {
        let body = r#"{"id":1}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{body}",
            body.len(),
        );
        let mut reader = FrameReader::new(frame.as_bytes());
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 1);
    }

    #[tokio::test]
    async fn test_content_length_counts_bytes() {
        let message = json!({"text": "let s = \"é\""});
        let mut buf = Vec::new();
        FrameWriter::new(&mut buf).write_frame(&message).await.unwrap();

        let body = serde_json::to_string(&message).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert!(body.len() > body.chars().count());
    }
}
