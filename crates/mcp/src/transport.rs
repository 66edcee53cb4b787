//! MCP transport layer.
//!
//! Defines the `McpTransport` trait for sending/receiving JSON-RPC lines and
//! a `LineTransport` that frames newline-delimited JSON over any async
//! reader/writer pair: the aggregator's own stdin/stdout on the upstream
//! side, a child's stdout/stdin on the backend side.

use async_trait::async_trait;
use std::borrow::Cow;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::McpError;

/// Trait for MCP message transport.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Read the next non-empty message line from the transport.
    /// Returns `None` when the transport is closed.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write one message line to the transport.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;
}

/// Newline-delimited JSON over an async reader and writer.
pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

/// The aggregator's own standard streams.
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

impl StdioTransport {
    /// Read from stdin, write to stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::stdio()
    }
}

#[async_trait]
impl<R, W> McpTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut buf).await?;
            if bytes_read == 0 {
                return Ok(None); // EOF
            }
            // Invalid UTF-8 is passed on lossily so the line fails to decode
            // as JSON instead of failing the stream.
            let line = String::from_utf8_lossy(&buf);
            if let Cow::Owned(_) = line {
                tracing::debug!(bytes = bytes_read, "Received line that is not valid UTF-8");
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport for testing, backed by channel pairs.
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::Receiver<String>,
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a pair of connected transports.
    ///
    /// Messages sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = tokio::sync::mpsc::channel(32);
        let (tx_b, rx_a) = tokio::sync::mpsc::channel(32);
        (
            Self { rx: rx_a, tx: tx_a },
            Self { rx: rx_b, tx: tx_b },
        )
    }

    /// Whether the other end has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl McpTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.tx
            .send(message.to_string())
            .await
            .map_err(|e| McpError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_pair() {
        let (mut a, mut b) = ChannelTransport::pair();

        a.send("hello from a").await.unwrap();
        let msg = b.receive().await.unwrap();
        assert_eq!(msg, Some("hello from a".to_string()));

        b.send("hello from b").await.unwrap();
        let msg = a.receive().await.unwrap();
        assert_eq!(msg, Some("hello from b".to_string()));
    }

    #[tokio::test]
    async fn test_channel_transport_closed() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        let result = a.receive().await.unwrap();
        assert_eq!(result, None);
        assert!(a.send("into the void").await.is_err());
    }

    #[tokio::test]
    async fn test_line_transport_skips_blank_lines() {
        let input: &[u8] = b"\n  \n{\"a\":1}\r\n\nsecond\n";
        let mut transport = LineTransport::new(input, Vec::new());

        assert_eq!(transport.receive().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.receive().await.unwrap().as_deref(), Some("second"));
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_transport_survives_invalid_utf8() {
        let input: &[u8] = b"\xff\xfe garbage\n{\"a\":1}\n";
        let mut transport = LineTransport::new(input, Vec::new());

        let first = transport.receive().await.unwrap().unwrap();
        assert!(first.ends_with("garbage"));
        assert!(serde_json::from_str::<serde_json::Value>(&first).is_err());
        assert_eq!(transport.receive().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_transport_send_appends_newline() {
        let (client, server) = tokio::io::duplex(256);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, client_write) = tokio::io::split(client);

        let mut sender = LineTransport::new(tokio::io::empty(), client_write);
        sender.send(r#"{"jsonrpc":"2.0"}"#).await.unwrap();
        sender.send("next").await.unwrap();

        let mut receiver = LineTransport::new(server_read, tokio::io::sink());
        assert_eq!(
            receiver.receive().await.unwrap().as_deref(),
            Some(r#"{"jsonrpc":"2.0"}"#)
        );
        assert_eq!(receiver.receive().await.unwrap().as_deref(), Some("next"));
    }
}
