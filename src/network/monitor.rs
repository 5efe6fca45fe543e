//! Network quality monitor.
//!
//! Runs an observation task that classifies every path snapshot from a
//! [`ReachabilityProvider`] and calls the handler only when the
//! classification actually changes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::quality::{NetworkQuality, classify};
use super::reachability::ReachabilityProvider;

// ============================================================================
// Types
// ============================================================================

/// Quality change callback.
pub type QualityHandler = Arc<dyn Fn(NetworkQuality) + Send + Sync>;

// ============================================================================
// NetworkQualityMonitor
// ============================================================================

/// Observes reachability and reports de-duplicated quality changes.
///
/// # Example
///
/// ```ignore
/// let monitor = NetworkQualityMonitor::new(Arc::new(ManualReachability::default()));
/// monitor.start(Arc::new(|quality| println!("now {quality}")));
/// // ...
/// monitor.stop();
/// ```
pub struct NetworkQualityMonitor {
    provider: Arc<dyn ReachabilityProvider>,
    current: Arc<Mutex<NetworkQuality>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for NetworkQualityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkQualityMonitor")
            .field("current", &self.current())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl NetworkQualityMonitor {
    /// Creates a stopped monitor over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ReachabilityProvider>) -> Self {
        Self {
            provider,
            current: Arc::new(Mutex::new(NetworkQuality::Unknown)),
            task: Mutex::new(None),
        }
    }

    /// Returns the last classification.
    #[inline]
    #[must_use]
    pub fn current(&self) -> NetworkQuality {
        *self.current.lock()
    }

    /// Returns `true` while the observation task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts observing and reports changes to `handler`.
    ///
    /// The current path is classified immediately. Calling `start` on a
    /// running monitor does nothing.
    pub fn start(&self, handler: QualityHandler) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Quality monitor already running");
            return;
        }

        let mut rx = self.provider.watch();
        let current = Arc::clone(&self.current);

        *task = Some(tokio::spawn(async move {
            loop {
                let path = *rx.borrow_and_update();
                let quality = classify(&path);

                let previous = {
                    let mut current = current.lock();
                    std::mem::replace(&mut *current, quality)
                };

                if previous != quality {
                    info!(from = %previous, to = %quality, "Network quality changed");
                    handler(quality);
                }

                if rx.changed().await.is_err() {
                    debug!("Reachability source closed");
                    break;
                }
            }
        }));

        debug!("Quality monitor started");
    }

    /// Stops observing. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("Quality monitor stopped");
        }
    }
}

impl Drop for NetworkQualityMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
