//! WebSocket transport over tokio-tungstenite.
//!
//! Tungstenite answers pings on its own while the read half is polled;
//! ping and pong frames never reach the connection.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::socket::{Frame, FrameSink, FrameStream, SocketPair, Transport};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WsTransport
// ============================================================================

/// Opens WebSocket connections with `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &str) -> Result<SocketPair> {
        let (stream, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(endpoint, status = %response.status(), "WebSocket handshake completed");

        let (write, read) = stream.split();
        Ok((
            Box::new(WsSink { inner: write }),
            Box::new(WsReader { inner: read }),
        ))
    }
}

// ============================================================================
// WsSink
// ============================================================================

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(data) => Message::binary(data),
            Frame::Close => Message::Close(None),
        };
        self.inner.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

// ============================================================================
// WsReader
// ============================================================================

struct WsReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsReader {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(data.to_vec()))),
                Ok(Message::Close(close)) => {
                    debug!(?close, "Close frame received");
                    return Some(Ok(Frame::Close));
                }
                Ok(other) => trace!(?other, "Skipping control frame"),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
