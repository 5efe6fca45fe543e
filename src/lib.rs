//! Adaptive WebSocket Client - real-time messaging over changing networks.
//!
//! This library sends prioritized messages to a remote service over a small
//! pool of WebSocket connections, adapting batching and compression to the
//! current network quality.
//!
//! # Architecture
//!
//! - **Quality**: reachability snapshots are classified into a
//!   [`NetworkQuality`]; each class maps to a batch size, a compression
//!   level, and a retry policy
//! - **Batching**: critical messages go out at once, everything else is
//!   flushed in priority-ordered, optionally gzip-compressed batches
//! - **Pool**: every send picks the connected member with the lowest latency
//!   and the fewest messages in flight
//! - **Recovery**: failures trigger reconnection with exponential backoff
//!   and jitter, retried until [`Client::disconnect`]
//!
//! # Quick Start
//!
//! ```no_run
//! use adaptive_ws_client::{Client, Priority, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .endpoint("ws://127.0.0.1:9000/ws")
//!         .build()?;
//!
//!     client.connect().await?;
//!
//!     client.send("zoom-in", "command", Priority::Critical);
//!     client.send("hello", "chat", Priority::Normal);
//!
//!     let report = client.performance_report();
//!     println!("success rate: {:.2}", report.success_rate);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], configuration, batching, backoff, metrics |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`network`] | Quality classification, monitor, policy |
//! | [`protocol`] | Messages, envelopes, batches, compression |
//! | [`transport`] | Sockets, connections, pool |

// ============================================================================
// Modules
// ============================================================================

/// Client orchestration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Network quality observation and policy.
pub mod network;

/// Message model and wire format.
pub mod protocol;

/// Sockets, pooled connections and the pool.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    BackoffConfig, Client, ClientBuilder, ClientConfig, ClientEvent, ClientState,
    PerformanceMetrics, PerformanceReport,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{BatchId, ClientId, ConnectionId};

// Network types
pub use network::{
    InterfaceKind, ManualReachability, NetworkQuality, PathAvailability, PathStatus,
    ReachabilityProvider,
};

// Protocol types
pub use protocol::{CompressionLevel, Envelope, Message, Payload, Priority};

// Transport types
pub use transport::{ConnectionState, ConnectionStats, Transport, WsTransport};
