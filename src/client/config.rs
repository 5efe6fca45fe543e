//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use adaptive_ws_client::ClientConfig;
//!
//! let config = ClientConfig::new("ws://127.0.0.1:9000/ws")
//!     .with_pool_size(2)
//!     .with_batch_flush_interval(Duration::from_millis(50));
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ClientId;

use super::reconnect::BackoffConfig;

// ============================================================================
// ClientConfig
// ============================================================================

/// Options recognized by [`crate::Client`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Service URL (`ws://` or `wss://`).
    pub endpoint: String,

    /// Identifier stamped on outgoing messages.
    pub client_id: ClientId,

    /// Number of pooled connections.
    pub pool_size: usize,

    /// Period of the batch flush timer.
    pub batch_flush_interval: Duration,

    /// First reconnection delay.
    pub initial_backoff: Duration,

    /// Reconnection delay cap.
    pub max_backoff: Duration,

    /// Reconnection delay growth factor.
    pub backoff_multiplier: f64,

    /// Reconnection delay jitter fraction.
    pub jitter_fraction: f64,

    /// Smoothing factor for the response time average.
    pub response_time_ewma_alpha: f64,

    /// Deadline for one socket write.
    pub send_timeout: Duration,

    /// Deadline for one socket handshake.
    pub connect_timeout: Duration,

    /// Age after which re-queued messages are discarded.
    pub message_ttl: Duration,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            client_id: ClientId::generate(),
            pool_size: 3,
            batch_flush_interval: Duration::from_millis(100),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
            response_time_ewma_alpha: 0.1,
            send_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            message_ttl: Duration::from_secs(60),
            event_capacity: 256,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a configuration for `endpoint` with default options.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Returns the backoff parameters.
    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.initial_backoff,
            max_delay: self.max_backoff,
            multiplier: self.backoff_multiplier,
            jitter_fraction: self.jitter_fraction,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientConfig {
    /// Sets the service URL.
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the client identifier.
    #[inline]
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the number of pooled connections.
    #[inline]
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the batch flush period.
    #[inline]
    #[must_use]
    pub fn with_batch_flush_interval(mut self, interval: Duration) -> Self {
        self.batch_flush_interval = interval;
        self
    }

    /// Sets the reconnection backoff.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.initial_backoff = backoff.initial_delay;
        self.max_backoff = backoff.max_delay;
        self.backoff_multiplier = backoff.multiplier;
        self.jitter_fraction = backoff.jitter_fraction;
        self
    }

    /// Sets the response time smoothing factor.
    #[inline]
    #[must_use]
    pub fn with_response_time_ewma_alpha(mut self, alpha: f64) -> Self {
        self.response_time_ewma_alpha = alpha;
        self
    }

    /// Sets the write deadline.
    #[inline]
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the re-queue lifetime of a message.
    #[inline]
    #[must_use]
    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    /// Sets the event channel capacity.
    #[inline]
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfig {
    /// Checks every option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        self.validate_endpoint()?;

        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be at least 1"));
        }
        if self.batch_flush_interval.is_zero() {
            return Err(Error::config("batch_flush_interval must be positive"));
        }
        if self.initial_backoff.is_zero() {
            return Err(Error::config("initial_backoff must be positive"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(Error::config("max_backoff must not be below initial_backoff"));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(Error::config("backoff_multiplier must be at least 1.0"));
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(Error::config("jitter_fraction must be in [0, 1)"));
        }
        if !(self.response_time_ewma_alpha > 0.0 && self.response_time_ewma_alpha <= 1.0) {
            return Err(Error::config("response_time_ewma_alpha must be in (0, 1]"));
        }
        if self.send_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::config("timeouts must be positive"));
        }
        if self.message_ttl.is_zero() {
            return Err(Error::config("message_ttl must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity must be at least 1"));
        }

        Ok(())
    }

    fn validate_endpoint(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::config(
                "endpoint is required.\n\
                 Example: Client::builder().endpoint(\"ws://127.0.0.1:9000/ws\")",
            ));
        }

        let url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(Error::config(format!(
                "endpoint scheme must be ws or wss, got {other}"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("ws://localhost:9000");
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.batch_flush_interval, Duration::from_millis(100));
        assert_eq!(config.backoff(), BackoffConfig::default());
        assert!((config.response_time_ewma_alpha - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.message_ttl, Duration::from_secs(60));
        assert!(!config.client_id.as_str().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_client_ids_differ() {
        assert_ne!(ClientConfig::default().client_id, ClientConfig::default().client_id);
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::new("ws://a")
            .with_endpoint("wss://b/ws")
            .with_client_id("ios-1")
            .with_pool_size(5)
            .with_send_timeout(Duration::from_secs(2))
            .with_event_capacity(8);

        assert_eq!(config.endpoint, "wss://b/ws");
        assert_eq!(config.client_id.as_str(), "ios-1");
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.send_timeout, Duration::from_secs(2));
        assert_eq!(config.event_capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_validation() {
        let missing = ClientConfig::default().validate().expect_err("missing endpoint");
        assert!(missing.to_string().contains("endpoint"));

        let http = ClientConfig::new("http://localhost").validate().expect_err("bad scheme");
        assert!(http.to_string().contains("scheme"));

        let garbage = ClientConfig::new("not a url").validate();
        assert!(matches!(garbage, Err(Error::Url(_))));
    }

    #[test]
    fn test_option_validation() {
        let base = ClientConfig::new("ws://localhost");

        let invalid = [
            base.clone().with_pool_size(0),
            base.clone().with_batch_flush_interval(Duration::ZERO),
            base.clone().with_backoff(BackoffConfig {
                max_delay: Duration::from_millis(10),
                ..BackoffConfig::default()
            }),
            base.clone().with_backoff(BackoffConfig {
                multiplier: 0.5,
                ..BackoffConfig::default()
            }),
            base.clone().with_backoff(BackoffConfig {
                jitter_fraction: 1.0,
                ..BackoffConfig::default()
            }),
            base.clone().with_response_time_ewma_alpha(0.0),
            base.clone().with_response_time_ewma_alpha(f64::NAN),
            base.clone().with_connect_timeout(Duration::ZERO),
            base.clone().with_message_ttl(Duration::ZERO),
            base.clone().with_event_capacity(0),
        ];

        for config in invalid {
            let err = config.validate().expect_err("should be rejected");
            assert!(matches!(err, Error::Config { .. }), "{err}");
        }
    }
}
