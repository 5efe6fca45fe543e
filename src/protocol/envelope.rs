//! Wire envelopes.
//!
//! # Single message
//!
//! ```json
//! {
//!   "type": "command",
//!   "content": "zoom-in",
//!   "timestamp": "2024-05-01T12:00:00.123Z",
//!   "clientId": "ios-42"
//! }
//! ```
//!
//! # Batch
//!
//! ```json
//! {
//!   "batchId": "uuid",
//!   "count": 2,
//!   "encoding": "identity",
//!   "messages": [ { ... }, { ... } ]
//! }
//! ```
//!
//! With `"encoding": "gzip"` the `messages` array is replaced by `payload`,
//! the base64 of the gzip-compressed JSON array.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::{BatchId, ClientId};

use super::compression;

// ============================================================================
// Envelope
// ============================================================================

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Text content (base64 for binary payloads).
    pub content: String,

    /// Creation time, ISO-8601 with millisecond precision.
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,

    /// Originating client.
    pub client_id: ClientId,
}

impl Envelope {
    /// Serializes the envelope to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid envelope.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// BatchEnvelope
// ============================================================================

/// Encoding of a batch body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Envelopes inline in `messages`.
    Identity,
    /// Envelopes gzip-compressed and base64-encoded in `payload`.
    Gzip,
}

/// Several envelopes sent as one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope {
    /// Batch identity.
    pub batch_id: BatchId,

    /// Number of envelopes in the batch.
    pub count: usize,

    /// Body encoding.
    pub encoding: Encoding,

    /// Inline envelopes (identity encoding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Envelope>>,

    /// Compressed envelopes (gzip encoding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl BatchEnvelope {
    /// Creates an identity-encoded batch envelope.
    #[must_use]
    pub fn inline(batch_id: BatchId, messages: Vec<Envelope>) -> Self {
        Self {
            batch_id,
            count: messages.len(),
            encoding: Encoding::Identity,
            messages: Some(messages),
            payload: None,
        }
    }

    /// Creates a gzip-encoded batch envelope from compressed bytes.
    #[must_use]
    pub fn compressed(batch_id: BatchId, count: usize, gzip: &[u8]) -> Self {
        Self {
            batch_id,
            count,
            encoding: Encoding::Gzip,
            messages: None,
            payload: Some(BASE64.encode(gzip)),
        }
    }

    /// Unpacks the envelopes carried by this batch.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the body is missing or the count mismatches
    /// - [`Error::CompressionFailure`] if the gzip payload is corrupt
    pub fn into_envelopes(self) -> Result<Vec<Envelope>> {
        let envelopes = match self.encoding {
            Encoding::Identity => self
                .messages
                .ok_or_else(|| Error::protocol("identity batch without messages"))?,
            Encoding::Gzip => {
                let payload = self
                    .payload
                    .ok_or_else(|| Error::protocol("gzip batch without payload"))?;
                let gzip = BASE64
                    .decode(payload)
                    .map_err(|e| Error::protocol(format!("invalid base64 payload: {e}")))?;
                let json = compression::decompress(&gzip)?;
                serde_json::from_slice(&json)?
            }
        };

        if envelopes.len() != self.count {
            return Err(Error::protocol(format!(
                "batch {} declares {} messages but carries {}",
                self.batch_id,
                self.count,
                envelopes.len()
            )));
        }

        Ok(envelopes)
    }
}

// ============================================================================
// Inbound Decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum WireFrame {
    Batch(BatchEnvelope),
    Single(Envelope),
}

/// Decodes a text frame into the envelopes it carries.
///
/// Accepts either a single envelope or a batch envelope.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the text is neither.
pub fn decode_frame(text: &str) -> Result<Vec<Envelope>> {
    match serde_json::from_str::<WireFrame>(text) {
        Ok(WireFrame::Single(envelope)) => Ok(vec![envelope]),
        Ok(WireFrame::Batch(batch)) => batch.into_envelopes(),
        Err(e) => Err(Error::protocol(format!("unrecognised frame: {e}"))),
    }
}

// ============================================================================
// Timestamp Format
// ============================================================================

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::protocol::compression::CompressionLevel;

    fn sample(kind: &str, content: &str) -> Envelope {
        Envelope {
            kind: kind.to_string(),
            content: content.to_string(),
            timestamp: DateTime::from_timestamp_millis(1_714_564_800_123).unwrap(),
            client_id: ClientId::new("ios-42"),
        }
    }

    #[test]
    fn test_envelope_field_names() {
        let json = sample("command", "zoom").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["content"], "zoom");
        assert_eq!(value["clientId"], "ios-42");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00.123Z");
    }

    #[test]
    fn test_envelope_accepts_offset_timestamps() {
        let text = r#"{"type":"t","content":"c","timestamp":"2024-05-01T14:00:00.123+02:00","clientId":"x"}"#;
        let envelope = Envelope::decode(text).unwrap();
        assert_eq!(envelope.timestamp.timestamp_millis(), 1_714_564_800_123);
    }

    #[test]
    fn test_inline_batch_roundtrip() {
        let envelopes = vec![sample("a", "1"), sample("b", "2")];
        let batch = BatchEnvelope::inline(BatchId::generate(), envelopes.clone());
        let text = serde_json::to_string(&batch).unwrap();
        assert!(!text.contains("payload"));
        assert_eq!(decode_frame(&text).unwrap(), envelopes);
    }

    #[test]
    fn test_gzip_batch_roundtrip() {
        let envelopes: Vec<_> = (0..20).map(|i| sample("draw", &format!("stroke-{i}"))).collect();
        let json = serde_json::to_vec(&envelopes).unwrap();
        let gzip = compression::compress(&json, CompressionLevel::High).unwrap();
        let batch = BatchEnvelope::compressed(BatchId::generate(), envelopes.len(), &gzip);

        let text = serde_json::to_string(&batch).unwrap();
        assert!(text.contains("\"encoding\":\"gzip\""));
        assert_eq!(decode_frame(&text).unwrap(), envelopes);
    }

    #[test]
    fn test_batch_count_mismatch_rejected() {
        let mut batch = BatchEnvelope::inline(BatchId::generate(), vec![sample("a", "1")]);
        batch.count = 3;
        let err = batch.into_envelopes().unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame("{\"hello\":1}").is_err());
        assert!(decode_frame("not json").is_err());
    }

    proptest! {
        #[test]
        fn prop_envelope_roundtrip(
            kind in "[a-z]{1,12}",
            content in any::<String>(),
            client in "[A-Za-z0-9-]{1,24}",
            millis in 0i64..4_102_444_800_000,
            nanos in 0u32..1_000_000,
        ) {
            let timestamp = DateTime::from_timestamp_millis(millis).unwrap()
                + chrono::TimeDelta::nanoseconds(i64::from(nanos));
            let original = Envelope {
                kind,
                content,
                timestamp,
                client_id: ClientId::new(client),
            };

            let decoded = Envelope::decode(&original.encode().unwrap()).unwrap();
            prop_assert_eq!(&decoded.kind, &original.kind);
            prop_assert_eq!(&decoded.content, &original.content);
            prop_assert_eq!(&decoded.client_id, &original.client_id);
            prop_assert_eq!(decoded.timestamp.timestamp_millis(), original.timestamp.timestamp_millis());
        }
    }
}
