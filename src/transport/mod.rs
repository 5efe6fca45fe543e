//! Transport layer.
//!
//! Sockets, pooled connections, and the pool that routes between them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                         ┌──────────────────┐
//! │  ConnectionPool  │                         │  Remote service  │
//! │                  │   Transport::open       │                  │
//! │  Connection ×N   │◄───────────────────────►│  WebSocket       │
//! │  (event loops)   │   FrameSink/FrameStream │  endpoint        │
//! └──────────────────┘                         └──────────────────┘
//!          │
//!          └── TransportEvent (inbound envelopes, drops) ──► Client
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::new` - Idle, no socket
//! 2. `Connection::connect` - Opens a socket and starts the event loop
//! 3. `Connection::send` / `send_batch` - Queue writes, await completion
//! 4. `Connection::disconnect` - Cancels waiting writes and closes the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | `Transport`, `FrameSink`, `FrameStream` traits |
//! | `websocket` | tokio-tungstenite implementation |
//! | `connection` | Pooled connection and event loop |
//! | `pool` | Fixed-size pool with load-aware selection |

// ============================================================================
// Submodules
// ============================================================================

/// Pooled connection and event loop.
pub mod connection;

/// Connection pool.
pub mod pool;

/// Socket abstraction.
pub mod socket;

/// WebSocket transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{
    Connection, ConnectionPriority, ConnectionSettings, ConnectionState, ConnectionStats,
};
pub use pool::ConnectionPool;
pub use socket::{Frame, FrameSink, FrameStream, SocketPair, Transport, TransportEvent};
pub use websocket::WsTransport;
