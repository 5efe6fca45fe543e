//! Error types for the adaptive WebSocket client.
//!
//! Errors raised while configuring, connecting and sending.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use adaptive_ws_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     client.connect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotConnected`] |
//! | Delivery | [`Error::SendTimeout`], [`Error::SendFailure`], [`Error::Cancelled`], [`Error::Expired`] |
//! | Payload | [`Error::CompressionFailure`], [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! # Propagation
//!
//! Connection and send failures are retried by the client and never surface
//! as fatal. Compression failures fall back to uncompressed payloads.
//! [`Error::Cancelled`] only reaches sends that were in flight when
//! `disconnect()` ran.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Shorthand for results carrying [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Client error.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the options.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Socket could not be opened or was dropped.
    #[error("Connection failed: {message}")]
    Connection {
        /// Why the socket could not be opened.
        message: String,
    },

    /// Socket did not open within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No connection is available to carry the message.
    #[error("Not connected: {message}")]
    NotConnected {
        /// What was being attempted.
        message: String,
    },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// No completion within the send timeout.
    #[error("Send on {connection_id} timed out after {timeout_ms}ms")]
    SendTimeout {
        /// Connection the send was issued on.
        connection_id: ConnectionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport reported an error while writing.
    #[error("Send failed: {message}")]
    SendFailure {
        /// Description of the transport error.
        message: String,
    },

    /// In-flight operation invalidated by `disconnect()`.
    #[error("Operation cancelled by disconnect")]
    Cancelled,

    /// Message outlived the retry queue's lifetime and was discarded.
    #[error("Message expired after {ttl_ms}ms")]
    Expired {
        /// Configured message lifetime.
        ttl_ms: u64,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Payload could not be compressed or decompressed.
    #[error("Compression failed: {message}")]
    CompressionFailure {
        /// Description of the codec error.
        message: String,
    },

    /// Malformed frame or envelope.
    #[error("Protocol error: {message}")]
    Protocol {
        /// What could not be decoded.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<WsError>),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Creates a send timeout error.
    #[inline]
    pub fn send_timeout(connection_id: ConnectionId, timeout_ms: u64) -> Self {
        Self::SendTimeout {
            connection_id,
            timeout_ms,
        }
    }

    /// Creates a send failure error.
    #[inline]
    pub fn send_failure(message: impl Into<String>) -> Self {
        Self::SendFailure {
            message: message.into(),
        }
    }

    /// Creates a message expiry error.
    #[inline]
    pub fn expired(ttl_ms: u64) -> Self {
        Self::Expired { ttl_ms }
    }

    /// Creates a compression failure error.
    #[inline]
    pub fn compression(message: impl Into<String>) -> Self {
        Self::CompressionFailure {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::SendTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error was caused by `disconnect()`.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the client should retry after this error.
    ///
    /// Retryable errors feed the retry queue and the reconnection loop.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_connection_error()
            || matches!(
                self,
                Self::SendTimeout { .. } | Self::SendFailure { .. } | Self::Io(_)
            )
    }
}

// ============================================================================
// Tests
// ============================================================================
