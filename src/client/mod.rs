//! Client orchestration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Public send/connect/disconnect surface |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientConfig`] | Recognized options and validation |
//! | [`MessageBatcher`] | Priority batching and flushes |
//! | [`ReconnectionStrategy`] | Backoff with jitter |
//! | [`PerformanceTracker`] | Success counters and response time |
//!
//! # Send Path
//!
//! ```text
//! Client::send ─► MessageBatcher ─┬─ critical ─► ConnectionPool::select_for ─► Connection::send
//!                                 └─ others ──► flush ─► select_optimal ─► Connection::send_batch
//!                                                                               │
//!                                       PerformanceTracker ◄── Completion ◄─────┘
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Priority batching.
pub mod batcher;

/// Fluent builder for the client.
pub mod builder;

/// Client options.
pub mod config;

/// Orchestrator.
pub mod core;

/// Client state and events.
pub mod events;

/// Performance tracking.
pub mod metrics;

/// Reconnection backoff.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use batcher::{Completion, MessageBatcher};
pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use core::Client;
pub use events::{ClientEvent, ClientState};
pub use metrics::{PerformanceMetrics, PerformanceReport, PerformanceTracker};
pub use reconnect::{BackoffConfig, ReconnectionStrategy};
