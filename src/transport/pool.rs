//! Fixed-size connection pool.
//!
//! All members target the same endpoint. Member 0 carries
//! [`ConnectionPriority::High`] and is the preferred route for critical
//! messages; every other member is `Normal`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ConnectionPool              │
//! │  ┌────────────────────────────────────┐  │
//! │  │ conn-0 (high)   ─┐                 │  │
//! │  │ conn-1 (normal) ─┼──► endpoint     │  │
//! │  │ conn-2 (normal) ─┘                 │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Priority;

use super::connection::{Connection, ConnectionPriority, ConnectionSettings, ConnectionStats};
use super::socket::{Transport, TransportEvent};

// ============================================================================
// ConnectionPool
// ============================================================================

/// A fixed set of connections with load-aware selection.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::new(3, settings, transport, events_tx);
/// pool.connect_all().await?;
///
/// if let Some(connection) = pool.select_optimal() {
///     connection.send(&message).await?;
/// }
/// ```
#[derive(Debug)]
pub struct ConnectionPool {
    connections: Vec<Connection>,
}

impl ConnectionPool {
    /// Creates `size` idle connections (at least one).
    #[must_use]
    pub fn new(
        size: usize,
        settings: ConnectionSettings,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let connections = (0..size.max(1))
            .map(|index| {
                let priority = if index == 0 {
                    ConnectionPriority::High
                } else {
                    ConnectionPriority::Normal
                };
                Connection::new(
                    ConnectionId::new(index as u32),
                    priority,
                    settings.clone(),
                    Arc::clone(&transport),
                    events.clone(),
                )
            })
            .collect();

        Self { connections }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the number of pool members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if the pool has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns all members.
    #[inline]
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the member with the given identifier.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.index() as usize)
    }

    /// Returns the number of connected members.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_connected()).count()
    }

    /// Returns a statistics snapshot of every member.
    #[must_use]
    pub fn stats(&self) -> Vec<ConnectionStats> {
        self.connections.iter().map(Connection::stats).collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connects every member concurrently.
    ///
    /// Returns the number of members that connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if no member connected.
    pub async fn connect_all(&self) -> Result<usize> {
        let results = join_all(self.connections.iter().map(Connection::connect)).await;

        let mut connected = 0;
        let mut last_error = None;
        for (connection, result) in self.connections.iter().zip(results) {
            match result {
                Ok(()) => connected += 1,
                Err(e) => {
                    debug!(connection_id = %connection.id(), error = %e, "Pool member failed to connect");
                    last_error = Some(e);
                }
            }
        }

        if connected == 0 {
            let reason = last_error.map_or_else(|| "no members".to_string(), |e| e.to_string());
            warn!(size = self.len(), %reason, "No pool member connected");
            return Err(Error::connection(format!(
                "all {} connections failed: {reason}",
                self.len()
            )));
        }

        info!(connected, size = self.len(), "Connection pool ready");
        Ok(connected)
    }

    /// Disconnects every member concurrently.
    pub async fn disconnect_all(&self) {
        join_all(self.connections.iter().map(Connection::disconnect)).await;
        debug!(size = self.len(), "Connection pool closed");
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Picks the connected member with the lowest latency, breaking ties
    /// by fewest messages in flight.
    #[must_use]
    pub fn select_optimal(&self) -> Option<Connection> {
        self.connections
            .iter()
            .filter(|c| c.is_connected())
            .map(|c| ((c.average_latency(), c.active_message_count()), c))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, c)| c.clone())
    }

    /// Picks the route for a message of the given priority.
    ///
    /// Critical messages go to the high-priority member while it is
    /// connected; everything else uses [`ConnectionPool::select_optimal`].
    #[must_use]
    pub fn select_for(&self, priority: Priority) -> Option<Connection> {
        if priority == Priority::Critical
            && let Some(high) = self
                .connections
                .iter()
                .find(|c| c.priority() == ConnectionPriority::High && c.is_connected())
        {
            return Some(high.clone());
        }
        self.select_optimal()
    }
}

// ============================================================================
// Tests
// ============================================================================
