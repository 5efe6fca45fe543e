//! Quality-driven compression and batching policy.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::protocol::CompressionLevel;

use super::quality::NetworkQuality;

// ============================================================================
// QualityPolicy
// ============================================================================

/// Batching parameters for one quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityPolicy {
    /// Gzip aggressiveness for batch bodies.
    pub compression_level: CompressionLevel,
    /// Maximum messages per batch.
    pub batch_size: usize,
    /// Re-enqueue messages from failed batches instead of dropping them.
    pub enable_retry_queue: bool,
}

impl QualityPolicy {
    const fn new(compression_level: CompressionLevel, batch_size: usize, enable_retry_queue: bool) -> Self {
        Self {
            compression_level,
            batch_size,
            enable_retry_queue,
        }
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        CompressionPolicy::policy_for(NetworkQuality::Unknown)
    }
}

// ============================================================================
// CompressionPolicy
// ============================================================================

/// Maps network quality to a [`QualityPolicy`] and caches the active one.
#[derive(Debug)]
pub struct CompressionPolicy {
    active: RwLock<(NetworkQuality, QualityPolicy)>,
}

impl CompressionPolicy {
    /// Creates a policy cache for the unknown quality.
    #[must_use]
    pub fn new() -> Self {
        let quality = NetworkQuality::Unknown;
        Self {
            active: RwLock::new((quality, Self::policy_for(quality))),
        }
    }

    /// Returns the policy for a quality level.
    ///
    /// | Quality | Compression | Batch size | Retry queue |
    /// |---------|-------------|------------|-------------|
    /// | cellular | high | 10 | yes |
    /// | wifi, ethernet | low | 5 | no |
    /// | limited, offline | medium | 8 | yes |
    /// | unknown | medium | 8 | no |
    #[must_use]
    pub const fn policy_for(quality: NetworkQuality) -> QualityPolicy {
        match quality {
            NetworkQuality::Cellular => QualityPolicy::new(CompressionLevel::High, 10, true),
            NetworkQuality::Wifi | NetworkQuality::Ethernet => {
                QualityPolicy::new(CompressionLevel::Low, 5, false)
            }
            NetworkQuality::Limited | NetworkQuality::Offline => {
                QualityPolicy::new(CompressionLevel::Medium, 8, true)
            }
            NetworkQuality::Unknown => QualityPolicy::new(CompressionLevel::Medium, 8, false),
        }
    }

    /// Switches to the policy for `quality` and returns it.
    pub fn apply(&self, quality: NetworkQuality) -> QualityPolicy {
        let policy = Self::policy_for(quality);
        *self.active.write() = (quality, policy);
        debug!(%quality, ?policy, "Compression policy applied");
        policy
    }

    /// Returns the active policy.
    #[inline]
    #[must_use]
    pub fn current(&self) -> QualityPolicy {
        self.active.read().1
    }

    /// Returns the quality the active policy was derived from.
    #[inline]
    #[must_use]
    pub fn quality(&self) -> NetworkQuality {
        self.active.read().0
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let cases = [
            (NetworkQuality::Cellular, CompressionLevel::High, 10, true),
            (NetworkQuality::Wifi, CompressionLevel::Low, 5, false),
            (NetworkQuality::Ethernet, CompressionLevel::Low, 5, false),
            (NetworkQuality::Limited, CompressionLevel::Medium, 8, true),
            (NetworkQuality::Offline, CompressionLevel::Medium, 8, true),
            (NetworkQuality::Unknown, CompressionLevel::Medium, 8, false),
        ];

        for (quality, level, size, retry) in cases {
            let policy = CompressionPolicy::policy_for(quality);
            assert_eq!(policy.compression_level, level, "{quality}");
            assert_eq!(policy.batch_size, size, "{quality}");
            assert_eq!(policy.enable_retry_queue, retry, "{quality}");
        }
    }

    #[test]
    fn test_apply_updates_cache() {
        let policy = CompressionPolicy::new();
        assert_eq!(policy.quality(), NetworkQuality::Unknown);
        assert_eq!(policy.current(), QualityPolicy::default());

        let applied = policy.apply(NetworkQuality::Cellular);
        assert_eq!(policy.current(), applied);
        assert_eq!(policy.quality(), NetworkQuality::Cellular);
        assert_eq!(applied.batch_size, 10);
    }
}
