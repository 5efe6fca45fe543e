//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use adaptive_ws_client::Client;
//!
//! # fn example() -> adaptive_ws_client::Result<()> {
//! let client = Client::builder()
//!     .endpoint("ws://127.0.0.1:9000/ws")
//!     .pool_size(2)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::identifiers::ClientId;
use crate::network::{ManualReachability, ReachabilityProvider};
use crate::transport::{Transport, WsTransport};

use super::config::ClientConfig;
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Options; the endpoint is required.
    config: ClientConfig,
    /// Socket factory, [`WsTransport`] when unset.
    transport: Option<Arc<dyn Transport>>,
    /// Path source, an unknown [`ManualReachability`] when unset.
    reachability: Option<Arc<dyn ReachabilityProvider>>,
    /// Fixed backoff jitter seed.
    backoff_seed: Option<u64>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_reachability", &self.reachability.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service URL.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Replaces all options.
    ///
    /// An endpoint set earlier is kept if `config` has none.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        let endpoint = std::mem::take(&mut self.config.endpoint);
        self.config = config;
        if self.config.endpoint.is_empty() {
            self.config.endpoint = endpoint;
        }
        self
    }

    /// Sets the client identifier.
    #[inline]
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    /// Sets the number of pooled connections.
    #[inline]
    #[must_use]
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size;
        self
    }

    /// Sets the socket factory.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the reachability source.
    #[inline]
    #[must_use]
    pub fn reachability(mut self, reachability: Arc<dyn ReachabilityProvider>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Makes backoff jitter reproducible.
    #[inline]
    #[must_use]
    pub fn backoff_seed(mut self, seed: u64) -> Self {
        self.backoff_seed = Some(seed);
        self
    }

    /// Builds the client with validation.
    ///
    /// Building spawns no tasks; a tokio runtime is needed from
    /// [`Client::connect`] on.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] if an option is invalid
    /// - [`crate::Error::Url`] if the endpoint does not parse
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport) as Arc<dyn Transport>);
        let reachability = self
            .reachability
            .unwrap_or_else(|| Arc::new(ManualReachability::default()) as Arc<dyn ReachabilityProvider>);

        Ok(Client::new(self.config, transport, reachability, self.backoff_seed))
    }
}

// ============================================================================
// Tests
// ============================================================================
