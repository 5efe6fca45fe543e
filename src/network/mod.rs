//! Network quality observation and the policies derived from it.
//!
//! # Flow
//!
//! ```text
//! ReachabilityProvider ──PathStatus──► NetworkQualityMonitor ──NetworkQuality──► handler
//!                                                                        │
//!                                                    CompressionPolicy::apply
//!                                                                        │
//!                                                             QualityPolicy ──► MessageBatcher
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `quality` | `NetworkQuality`, `PathStatus`, classification |
//! | `reachability` | Provider trait and the manually-fed provider |
//! | `monitor` | De-duplicating observation task |
//! | `policy` | Quality → compression/batch size/retry table |

// ============================================================================
// Submodules
// ============================================================================

/// De-duplicating quality monitor.
pub mod monitor;

/// Quality-driven batching policy.
pub mod policy;

/// Quality classes and path classification.
pub mod quality;

/// Reachability providers.
pub mod reachability;

// ============================================================================
// Re-exports
// ============================================================================

pub use monitor::{NetworkQualityMonitor, QualityHandler};
pub use policy::{CompressionPolicy, QualityPolicy};
pub use quality::{InterfaceKind, NetworkQuality, PathAvailability, PathStatus, classify};
pub use reachability::{ManualReachability, ReachabilityProvider};
