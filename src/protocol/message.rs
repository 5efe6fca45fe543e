//! Outbound message model.
//!
//! A [`Message`] is immutable once constructed. It is owned by the caller
//! until handed to the batcher, then by the batcher or a connection until
//! its send completes or it ages out of the retry queue.

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::ClientId;

use super::envelope::Envelope;

// ============================================================================
// Priority
// ============================================================================

/// Message urgency.
///
/// Totally ordered: `Critical > High > Normal > Low`. Critical messages are
/// never batched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background traffic.
    Low,
    /// Regular traffic.
    #[default]
    Normal,
    /// Traffic that should lead its batch.
    High,
    /// Sent immediately, bypassing the batcher.
    Critical,
}

impl Priority {
    /// Returns `true` if messages of this priority skip batching.
    #[inline]
    #[must_use]
    pub const fn bypasses_batching(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text, sent as-is.
    Text(String),
    /// Raw bytes, base64-encoded on the wire.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the envelope `content` string.
    #[must_use]
    pub fn to_content(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => BASE64.encode(bytes),
        }
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

// ============================================================================
// Message
// ============================================================================

/// An outbound message.
///
/// # Example
///
/// ```ignore
/// let message = Message::new("command", "zoom-in", ClientId::new("ios"), Priority::High);
/// assert_eq!(message.kind(), "command");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: String,
    payload: Payload,
    created_at: DateTime<Utc>,
    origin_id: ClientId,
    priority: Priority,
}

impl Message {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        payload: impl Into<Payload>,
        origin_id: ClientId,
        priority: Priority,
    ) -> Self {
        Self::with_timestamp(kind, payload, origin_id, priority, Utc::now())
    }

    /// Creates a message with an explicit creation time.
    #[must_use]
    pub fn with_timestamp(
        kind: impl Into<String>,
        payload: impl Into<Payload>,
        origin_id: ClientId,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
            created_at,
            origin_id,
            priority,
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the originating client.
    #[inline]
    #[must_use]
    pub fn origin_id(&self) -> &ClientId {
        &self.origin_id
    }

    /// Returns the priority.
    #[inline]
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns how long ago the message was created, saturating at zero.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Builds the wire envelope for this message.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            kind: self.kind.clone(),
            content: self.payload.to_content(),
            timestamp: self.created_at,
            client_id: self.origin_id.clone(),
        }
    }

    /// Batch ordering: priority descending, then creation time ascending.
    ///
    /// Used with a stable sort, so messages equal on both keys keep their
    /// enqueue order.
    #[inline]
    #[must_use]
    pub fn batch_order(a: &Self, b: &Self) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    }
}

// ============================================================================
// Tests
// ============================================================================
