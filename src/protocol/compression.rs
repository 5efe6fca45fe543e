//! Gzip compression for batch payloads.
//!
//! Payloads below [`COMPRESSION_THRESHOLD`] are left alone; compressing them
//! costs more than it saves. Callers treat any [`Error::CompressionFailure`]
//! as a signal to send the payload uncompressed.

// ============================================================================
// Imports
// ============================================================================

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Payloads smaller than this are sent uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 512;

/// Largest payload [`decompress`] will inflate.
pub const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// CompressionLevel
// ============================================================================

/// How aggressively batch payloads are compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Fastest gzip level.
    Low,
    /// Balanced gzip level.
    Medium,
    /// Smallest output.
    High,
}

impl CompressionLevel {
    /// Returns the flate2 setting for this level.
    #[inline]
    #[must_use]
    pub fn to_flate2(self) -> Compression {
        match self {
            Self::Low => Compression::fast(),
            Self::Medium => Compression::default(),
            Self::High => Compression::best(),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Returns `true` if the payload is large enough to be worth compressing.
#[inline]
#[must_use]
pub fn should_compress(data: &[u8]) -> bool {
    data.len() >= COMPRESSION_THRESHOLD
}

/// Compresses data with gzip at the given level.
///
/// # Errors
///
/// Returns [`Error::CompressionFailure`] if the encoder fails.
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), level.to_flate2());
    encoder
        .write_all(data)
        .map_err(|e| Error::compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::compression(e.to_string()))
}

/// Decompresses gzip data.
///
/// # Errors
///
/// Returns [`Error::CompressionFailure`] if the data is not valid gzip or
/// inflates past [`MAX_DECOMPRESSED_SIZE`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_limited(data, MAX_DECOMPRESSED_SIZE)
}

fn decompress_limited(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    if !is_gzip(data) {
        return Err(Error::compression("missing gzip header"));
    }

    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::compression(e.to_string()))?;

    if out.len() > limit {
        return Err(Error::compression(format!(
            "payload inflates past {limit} bytes"
        )));
    }
    Ok(out)
}

/// Checks the gzip magic bytes.
#[inline]
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

// ============================================================================
// Tests
// ============================================================================
