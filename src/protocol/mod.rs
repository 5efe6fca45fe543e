//! Message model and wire format.
//!
//! # Protocol Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `Envelope` | Both | One message: `type`, `content`, `timestamp`, `clientId` |
//! | `BatchEnvelope` | Local → Remote | Several envelopes plus `batchId`, optionally gzip |
//!
//! Only the transport envelope is defined here. What a given `type` means
//! is up to the application.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | `Message`, `Payload` and `Priority` |
//! | `envelope` | Wire envelopes and inbound frame decoding |
//! | `compression` | Gzip levels and codec |
//! | `batch` | Sealed, immutable batches |

// ============================================================================
// Submodules
// ============================================================================

/// Sealed batches of outbound messages.
pub mod batch;

/// Gzip compression for batch bodies.
pub mod compression;

/// Wire envelope types.
pub mod envelope;

/// Outbound message model.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use batch::Batch;
pub use compression::CompressionLevel;
pub use envelope::{BatchEnvelope, Encoding, Envelope, decode_frame};
pub use message::{Message, Payload, Priority};
