//! Send performance tracking.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::network::NetworkQuality;
use crate::transport::ConnectionStats;

// ============================================================================
// Constants
// ============================================================================

/// Response time at or above which performance is not optimal.
pub const OPTIMAL_RESPONSE_TIME: Duration = Duration::from_secs(1);

/// Success rate at or below which performance is not optimal.
pub const OPTIMAL_SUCCESS_RATE: f64 = 0.95;

// ============================================================================
// PerformanceMetrics
// ============================================================================

/// Counters and response time average for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Completions recorded.
    pub total_messages: u64,
    /// Successful completions.
    pub successful_messages: u64,
    /// Failed completions.
    pub failed_messages: u64,
    /// Moving average of successful response times.
    #[serde(serialize_with = "serialize_millis")]
    pub average_response_time: Duration,
    /// Time of the last recorded completion.
    pub last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    fn new() -> Self {
        Self {
            total_messages: 0,
            successful_messages: 0,
            failed_messages: 0,
            average_response_time: Duration::ZERO,
            last_updated: Utc::now(),
        }
    }

    /// Returns `successful / total`, or 0 before the first completion.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.successful_messages as f64 / self.total_messages as f64
        }
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

// ============================================================================
// PerformanceTracker
// ============================================================================

/// Accumulates send completions.
#[derive(Debug)]
pub struct PerformanceTracker {
    alpha: f64,
    metrics: Mutex<PerformanceMetrics>,
}

impl PerformanceTracker {
    /// Creates a tracker with the given smoothing factor.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            metrics: Mutex::new(PerformanceMetrics::new()),
        }
    }

    /// Records one completion.
    ///
    /// The response time average only moves on success.
    pub fn record(&self, success: bool, response_time: Duration) {
        let mut metrics = self.metrics.lock();
        metrics.total_messages += 1;
        if success {
            metrics.successful_messages += 1;
            metrics.average_response_time = metrics.average_response_time.mul_f64(1.0 - self.alpha)
                + response_time.mul_f64(self.alpha);
        } else {
            metrics.failed_messages += 1;
        }
        metrics.last_updated = Utc::now();
    }

    /// Returns a copy of the current metrics.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> PerformanceMetrics {
        self.metrics.lock().clone()
    }

    /// Returns the success rate in `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.metrics.lock().success_rate()
    }
}

// ============================================================================
// PerformanceReport
// ============================================================================

/// Client-wide health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// Send metrics.
    pub metrics: PerformanceMetrics,
    /// `metrics.success_rate()`.
    pub success_rate: f64,
    /// Current network quality.
    pub quality: NetworkQuality,
    /// Whether the client is connected.
    pub connected: bool,
    /// Fast, reliable and online.
    pub optimal: bool,
    /// Per-connection statistics.
    pub connections: Vec<ConnectionStats>,
}

/// Fast, reliable and online: average response under one second, success
/// rate above 95%, quality not offline.
#[must_use]
pub fn is_optimal(metrics: &PerformanceMetrics, quality: NetworkQuality) -> bool {
    metrics.average_response_time < OPTIMAL_RESPONSE_TIME
        && metrics.success_rate() > OPTIMAL_SUCCESS_RATE
        && quality != NetworkQuality::Offline
}

// ============================================================================
// Tests
// ============================================================================
