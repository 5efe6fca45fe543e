//! Socket abstraction.
//!
//! A [`Transport`] opens one message-oriented socket and hands back its two
//! halves. Connections own the halves and drive them from their event loop,
//! so implementations never need internal locking.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::protocol::Envelope;

// ============================================================================
// Frame
// ============================================================================

/// One transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Remote end closed the socket.
    Close,
}

// ============================================================================
// Traits
// ============================================================================

/// Write half of a socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one frame. Completes once the frame is handed to the OS.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Closes the socket gracefully.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a socket.
#[async_trait]
pub trait FrameStream: Send {
    /// Reads the next data frame. `None` means the socket ended.
    ///
    /// Must be cancel-safe: the connection polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// Both halves of an open socket.
pub type SocketPair = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// Opens sockets to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a socket to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the socket cannot be opened.
    async fn open(&self, endpoint: &str) -> Result<SocketPair>;
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Out-of-band notifications from pool members.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An envelope arrived from the remote service.
    Inbound {
        /// Connection that received it.
        connection_id: ConnectionId,
        /// Decoded envelope.
        envelope: Envelope,
    },

    /// A connected socket ended without `disconnect()` being called.
    Dropped {
        /// Connection that dropped.
        connection_id: ConnectionId,
        /// Why the socket ended.
        reason: String,
    },
}
