//! Exponential backoff with bounded jitter.
//!
//! # Example
//!
//! ```ignore
//! let mut strategy = ReconnectionStrategy::new(BackoffConfig::default());
//! let first = strategy.next_delay();   // ~1s ± 10%
//! let second = strategy.next_delay();  // ~2s ± 10%
//! strategy.reset();                    // back to ~1s
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

// ============================================================================
// BackoffConfig
// ============================================================================

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackoffConfig {
    /// Delay returned by the first call after a reset.
    pub initial_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    /// Growth factor per call.
    pub multiplier: f64,
    /// Jitter as a fraction of the capped delay.
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

// ============================================================================
// ReconnectionStrategy
// ============================================================================

/// Computes successive reconnection delays.
///
/// Each call to [`ReconnectionStrategy::next_delay`] returns
/// `min(current, max)` shifted by a uniform `±jitter_fraction` of itself,
/// then grows `current` by the multiplier. The unjittered delay never
/// exceeds `max_delay`.
#[derive(Debug)]
pub struct ReconnectionStrategy {
    config: BackoffConfig,
    current_delay: Duration,
    rng: StdRng,
}

impl ReconnectionStrategy {
    /// Creates a strategy seeded from OS entropy.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates a strategy with a fixed seed.
    #[must_use]
    pub fn seeded(config: BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            rng,
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Returns the unjittered delay the next call will be based on.
    #[inline]
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Returns the next delay and advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_delay.min(self.config.max_delay);

        let delay = if self.config.jitter_fraction > 0.0 {
            let offset = self.rng.gen_range(-1.0..=1.0) * self.config.jitter_fraction;
            base.mul_f64((1.0 + offset).max(0.0))
        } else {
            base
        };

        self.current_delay = self
            .current_delay
            .mul_f64(self.config.multiplier)
            .min(self.config.max_delay);

        delay
    }

    /// Restarts from the initial delay.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
    }
}

// ============================================================================
// Tests
// ============================================================================
