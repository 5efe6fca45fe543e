//! Reachability sources.
//!
//! [`ReachabilityProvider`] is the seam between the client and whatever the
//! host platform uses to report path changes. The client only needs the
//! current snapshot and a way to wait for the next one.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;
use tracing::debug;

use super::quality::{NetworkQuality, PathStatus, classify};

// ============================================================================
// ReachabilityProvider
// ============================================================================

/// Source of path-change events.
///
/// Implementations wrap the platform API. Each call to [`watch`] returns an
/// independent receiver that observes every subsequent snapshot.
///
/// [`watch`]: ReachabilityProvider::watch
pub trait ReachabilityProvider: Send + Sync {
    /// Returns the current path snapshot.
    fn current_path(&self) -> PathStatus;

    /// Subscribes to path changes.
    fn watch(&self) -> watch::Receiver<PathStatus>;

    /// Classifies the current path.
    fn classify(&self) -> NetworkQuality {
        classify(&self.current_path())
    }
}

// ============================================================================
// ManualReachability
// ============================================================================

/// Reachability fed by the host application.
///
/// Platforms without a native binding push snapshots through
/// [`update`](Self::update); tests use it to simulate path changes.
#[derive(Debug)]
pub struct ManualReachability {
    tx: watch::Sender<PathStatus>,
}

impl ManualReachability {
    /// Creates a provider starting at the given snapshot.
    #[must_use]
    pub fn new(initial: PathStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publishes a new snapshot.
    ///
    /// Identical consecutive snapshots are not re-published.
    pub fn update(&self, path: PathStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == path {
                false
            } else {
                *current = path;
                true
            }
        });

        if changed {
            debug!(?path, "Reachability path updated");
        }
    }
}

impl Default for ManualReachability {
    fn default() -> Self {
        Self::new(PathStatus::unknown())
    }
}

impl ReachabilityProvider for ManualReachability {
    fn current_path(&self) -> PathStatus {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<PathStatus> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
