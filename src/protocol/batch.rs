//! Sealed batches of outbound messages.
//!
//! A [`Batch`] is built once at flush time and never mutated. Messages keep
//! the order they were sealed in (the batcher sorts them first).

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

use crate::error::Result;
use crate::identifiers::BatchId;

use super::compression::{self, CompressionLevel};
use super::envelope::{BatchEnvelope, Envelope};
use super::message::Message;

// ============================================================================
// Batch
// ============================================================================

/// An ordered, immutable group of messages flushed together.
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    messages: Vec<Message>,
    compressed_payload: Option<Vec<u8>>,
}

impl Batch {
    /// Seals messages into a batch, compressing the body when worthwhile.
    ///
    /// Compression is skipped for small bodies and for bodies that do not
    /// shrink. A compression failure falls back to an uncompressed batch.
    #[must_use]
    pub fn seal(messages: Vec<Message>, level: CompressionLevel) -> Self {
        let id = BatchId::generate();
        let compressed_payload = Self::compress_body(id, &messages, level);

        Self {
            id,
            messages,
            compressed_payload,
        }
    }

    fn compress_body(id: BatchId, messages: &[Message], level: CompressionLevel) -> Option<Vec<u8>> {
        let envelopes: Vec<Envelope> = messages.iter().map(Message::to_envelope).collect();

        let json = match serde_json::to_vec(&envelopes) {
            Ok(json) => json,
            Err(e) => {
                warn!(batch_id = %id, error = %e, "Batch body serialization failed");
                return None;
            }
        };

        if !compression::should_compress(&json) {
            return None;
        }

        match compression::compress(&json, level) {
            Ok(gzip) if gzip.len() < json.len() => {
                trace!(
                    batch_id = %id,
                    raw = json.len(),
                    compressed = gzip.len(),
                    ?level,
                    "Batch compressed"
                );
                Some(gzip)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(batch_id = %id, error = %e, "Compression failed, sending uncompressed");
                None
            }
        }
    }

    /// Returns the batch ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Returns the messages in send order.
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the batch holds no messages.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the gzip body, if the batch was compressed.
    #[inline]
    #[must_use]
    pub fn compressed_payload(&self) -> Option<&[u8]> {
        self.compressed_payload.as_deref()
    }

    /// Returns `true` if the batch body is compressed.
    #[inline]
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed_payload.is_some()
    }

    /// Builds the wire envelope for this batch.
    #[must_use]
    pub fn to_wire(&self) -> BatchEnvelope {
        match &self.compressed_payload {
            Some(gzip) => BatchEnvelope::compressed(self.id, self.messages.len(), gzip),
            None => BatchEnvelope::inline(
                self.id,
                self.messages.iter().map(Message::to_envelope).collect(),
            ),
        }
    }

    /// Serializes the batch to a JSON text frame body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_wire())?)
    }

    /// Consumes the batch, returning its messages for re-enqueue.
    #[inline]
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::ClientId;
    use crate::protocol::envelope::{Encoding, decode_frame};
    use crate::protocol::message::Priority;

    fn messages(count: usize, content_len: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                Message::new(
                    "draw",
                    format!("{i}:{}", "x".repeat(content_len)),
                    ClientId::new("c"),
                    Priority::Normal,
                )
            })
            .collect()
    }

    #[test]
    fn test_small_batch_is_not_compressed() {
        let batch = Batch::seal(messages(2, 4), CompressionLevel::High);
        assert!(!batch.is_compressed());
        assert_eq!(batch.to_wire().encoding, Encoding::Identity);
    }

    #[test]
    fn test_large_batch_is_compressed() {
        let batch = Batch::seal(messages(10, 200), CompressionLevel::High);
        assert!(batch.is_compressed());
        assert_eq!(batch.to_wire().encoding, Encoding::Gzip);
    }

    #[test]
    fn test_encode_roundtrips_envelopes_in_order() {
        let input = messages(10, 200);
        let expected: Vec<_> = input.iter().map(Message::to_envelope).collect();
        let batch = Batch::seal(input, CompressionLevel::Medium);

        let decoded = decode_frame(&batch.encode().unwrap()).unwrap();
        assert_eq!(decoded.len(), expected.len());
        for (got, want) in decoded.iter().zip(&expected) {
            assert_eq!(got.content, want.content);
            assert_eq!(got.kind, want.kind);
        }
    }

    #[test]
    fn test_into_messages_preserves_order() {
        let input = messages(5, 1);
        let batch = Batch::seal(input.clone(), CompressionLevel::Low);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.into_messages(), input);
    }
}
