//! Client state and the events published to subscribers.

use std::fmt;

use serde::Serialize;

use crate::network::NetworkQuality;
use crate::protocol::Envelope;

use super::metrics::PerformanceMetrics;

// ============================================================================
// ClientState
// ============================================================================

/// Connection state of the client as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    /// Not connected, no reconnection running.
    #[default]
    Disconnected,
    /// First connect or a reconnection attempt is in progress.
    Connecting,
    /// At least one pool member is connected.
    Connected,
    /// Connection lost; a retry is scheduled.
    Failed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ClientEvent
// ============================================================================

/// Notification broadcast by [`crate::Client::subscribe`].
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The client state changed.
    StateChanged(ClientState),
    /// The network quality classification changed.
    QualityChanged(NetworkQuality),
    /// Completions were recorded.
    MetricsUpdated(PerformanceMetrics),
    /// An envelope arrived from the remote service.
    Message(Envelope),
}
