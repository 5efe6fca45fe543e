//! Client orchestrator.
//!
//! The [`Client`] wires the quality monitor, batching policy, batcher,
//! connection pool, performance tracker and reconnection strategy together.
//!
//! # Tasks
//!
//! `connect()` starts four background tasks, all stopped by `disconnect()`:
//!
//! | Task | Role |
//! |------|------|
//! | quality monitor | Applies the policy for each new quality |
//! | flush timer | Calls `MessageBatcher::flush` every interval |
//! | completions | Records outcomes, triggers reconnection on failure |
//! | transport events | Republishes inbound envelopes, reacts to drops |
//!
//! A fifth task, the reconnection loop, runs only while reconnecting.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::ClientId;
use crate::network::{
    CompressionPolicy, NetworkQuality, NetworkQualityMonitor, QualityHandler, ReachabilityProvider,
};
use crate::protocol::{Message, Payload, Priority};
use crate::transport::{ConnectionPool, ConnectionSettings, Transport, TransportEvent};

use super::batcher::{Completion, MessageBatcher};
use super::builder::ClientBuilder;
use super::config::ClientConfig;
use super::events::{ClientEvent, ClientState};
use super::metrics::{PerformanceMetrics, PerformanceReport, PerformanceTracker, is_optimal};
use super::reconnect::ReconnectionStrategy;

// ============================================================================
// Types
// ============================================================================

type SharedReceiver<T> = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>>;

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    config: ClientConfig,
    state: Mutex<ClientState>,

    pool: Arc<ConnectionPool>,
    batcher: MessageBatcher,
    tracker: PerformanceTracker,
    policy: CompressionPolicy,
    reconnect: Mutex<ReconnectionStrategy>,
    monitor: NetworkQualityMonitor,

    quality: watch::Sender<NetworkQuality>,
    events: broadcast::Sender<ClientEvent>,

    /// Receivers outlive the tasks draining them, so a reconnect can resume.
    completions: SharedReceiver<Completion>,
    transport_events: SharedReceiver<TransportEvent>,

    tasks: Mutex<Vec<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,

    /// Serializes `connect` and `disconnect`.
    lifecycle: tokio::sync::Mutex<()>,
}

// ============================================================================
// Client
// ============================================================================

/// Adaptive real-time messaging client.
///
/// Cheap to clone; clones share one pool and one set of background tasks.
///
/// # Examples
///
/// ```no_run
/// use adaptive_ws_client::{Client, Priority};
///
/// # async fn example() -> adaptive_ws_client::Result<()> {
/// let client = Client::builder()
///     .endpoint("ws://127.0.0.1:9000/ws")
///     .build()?;
///
/// client.connect().await?;
/// client.send("zoom-in", "command", Priority::Critical);
/// client.send("hello", "chat", Priority::Normal);
///
/// println!("{:?}", client.performance_report());
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.endpoint)
            .field("client_id", &self.inner.config.client_id)
            .field("state", &self.state())
            .field("quality", &self.connection_quality())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        reachability: Arc<dyn ReachabilityProvider>,
        backoff_seed: Option<u64>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let pool = Arc::new(ConnectionPool::new(
            config.pool_size,
            ConnectionSettings {
                endpoint: config.endpoint.clone(),
                connect_timeout: config.connect_timeout,
                send_timeout: config.send_timeout,
            },
            transport,
            transport_tx,
        ));

        let policy = CompressionPolicy::new();
        let batcher = MessageBatcher::new(
            Arc::clone(&pool),
            policy.current(),
            config.message_ttl,
            completion_tx,
        );

        let reconnect = match backoff_seed {
            Some(seed) => ReconnectionStrategy::seeded(config.backoff(), seed),
            None => ReconnectionStrategy::new(config.backoff()),
        };

        let (events, _) = broadcast::channel(config.event_capacity);
        let (quality, _) = watch::channel(NetworkQuality::Unknown);

        Self {
            inner: Arc::new(ClientInner {
                tracker: PerformanceTracker::new(config.response_time_ewma_alpha),
                config,
                state: Mutex::new(ClientState::Disconnected),
                pool,
                batcher,
                policy,
                reconnect: Mutex::new(reconnect),
                monitor: NetworkQualityMonitor::new(reachability),
                quality,
                events,
                completions: Arc::new(tokio::sync::Mutex::new(completion_rx)),
                transport_events: Arc::new(tokio::sync::Mutex::new(transport_rx)),
                tasks: Mutex::new(Vec::new()),
                reconnect_task: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Connects the pool and starts the background tasks.
    ///
    /// On failure a reconnection loop keeps retrying with backoff until
    /// [`Client::disconnect`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if no pool member connected on
    /// the first attempt.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.state() == ClientState::Connected {
            return Ok(());
        }

        self.set_state(ClientState::Connecting);
        self.inner.batcher.resume();
        self.start_background_tasks();

        match self.inner.pool.connect_all().await {
            Ok(connected) => {
                self.on_connected();
                info!(connected, endpoint = %self.inner.config.endpoint, "Client connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(ClientState::Failed);
                warn!(error = %e, "Initial connection failed, retrying in background");
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Disconnects and stops all background work.
    ///
    /// Sends in flight complete with [`crate::Error::Cancelled`]. Messages
    /// still waiting for a flush are kept for the next `connect()`.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        self.set_state(ClientState::Disconnected);

        let reconnect = self.inner.reconnect_task.lock().take();
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        let handles: Vec<_> = reconnect.into_iter().chain(tasks).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.monitor.stop();
        self.inner.batcher.pause();
        self.inner.pool.disconnect_all().await;
        self.inner.batcher.settle().await;
        let discarded = self.discard_stale_events().await;

        info!(pending = self.inner.batcher.pending_len(), discarded, "Client disconnected");
    }

    /// Queues a message for delivery.
    ///
    /// Never blocks. Critical messages are written immediately; the rest go
    /// out with the next flush.
    pub fn send(&self, content: impl Into<Payload>, kind: impl Into<String>, priority: Priority) {
        let message = Message::new(kind, content, self.inner.config.client_id.clone(), priority);
        trace!(kind = message.kind(), %priority, "Message accepted");
        self.inner.batcher.enqueue(message);
    }

    /// Flushes pending messages now instead of waiting for the timer.
    ///
    /// Returns the number of batches sent.
    pub fn flush(&self) -> usize {
        self.inner.batcher.flush()
    }

    /// Returns `true` while the client is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Returns the client state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Returns the current network quality.
    #[inline]
    #[must_use]
    pub fn connection_quality(&self) -> NetworkQuality {
        *self.inner.quality.borrow()
    }

    /// Returns the client identifier stamped on outgoing messages.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.inner.config.client_id
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the number of messages waiting for a flush.
    #[inline]
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.inner.batcher.pending_len()
    }

    /// Subscribes to client events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Watches the network quality.
    #[must_use]
    pub fn quality_watch(&self) -> watch::Receiver<NetworkQuality> {
        self.inner.quality.subscribe()
    }

    /// Returns a copy of the send metrics.
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.tracker.snapshot()
    }

    /// Builds a health report.
    #[must_use]
    pub fn performance_report(&self) -> PerformanceReport {
        let metrics = self.inner.tracker.snapshot();
        let quality = self.connection_quality();

        PerformanceReport {
            success_rate: metrics.success_rate(),
            optimal: is_optimal(&metrics, quality),
            metrics,
            quality,
            connected: self.is_connected(),
            connections: self.inner.pool.stats(),
        }
    }

    /// Returns `true` if sends are fast and reliable and the network is up.
    #[must_use]
    pub fn is_performance_optimal(&self) -> bool {
        is_optimal(&self.inner.tracker.snapshot(), self.connection_quality())
    }
}

// ============================================================================
// Client - State
// ============================================================================

impl Client {
    fn set_state(&self, state: ClientState) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Client state changed");
            let _ = self.inner.events.send(ClientEvent::StateChanged(state));
        }
    }

    /// Empties the channels whose tasks were just stopped, so nothing from
    /// this session is handled after the next `connect()`.
    ///
    /// Inbound envelopes are still published.
    async fn discard_stale_events(&self) -> usize {
        let mut discarded = 0;

        {
            let mut completions = self.inner.completions.lock().await;
            while completions.try_recv().is_ok() {
                discarded += 1;
            }
        }

        let mut transport_events = self.inner.transport_events.lock().await;
        while let Ok(event) = transport_events.try_recv() {
            match event {
                TransportEvent::Inbound { envelope, .. } => {
                    let _ = self.inner.events.send(ClientEvent::Message(envelope));
                }
                TransportEvent::Dropped { .. } => discarded += 1,
            }
        }

        if discarded > 0 {
            debug!(discarded, "Discarded events from the closed session");
        }
        discarded
    }

    fn on_connected(&self) {
        self.set_state(ClientState::Connected);
        self.inner.reconnect.lock().reset();
    }
}

// ============================================================================
// Client - Reconnection
// ============================================================================

impl Client {
    /// Starts a reconnection unless one is already running or the client was
    /// disconnected on purpose.
    pub(crate) fn attempt_reconnection(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ClientState::Connected | ClientState::Failed => *state = ClientState::Connecting,
                ClientState::Connecting | ClientState::Disconnected => return,
            }
        }
        let _ = self
            .inner
            .events
            .send(ClientEvent::StateChanged(ClientState::Connecting));

        info!("Reconnection triggered");
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        let mut slot = self.inner.reconnect_task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *slot = Some(tokio::spawn(Self::reconnect_loop(Arc::downgrade(&self.inner))));
    }

    async fn reconnect_loop(weak: Weak<ClientInner>) {
        let mut attempt: u32 = 0;

        loop {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let delay = inner.reconnect.lock().next_delay();
            drop(inner);

            attempt += 1;
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = Client { inner };
            if matches!(client.state(), ClientState::Disconnected | ClientState::Connected) {
                return;
            }

            client.set_state(ClientState::Connecting);
            match client.inner.pool.connect_all().await {
                Ok(connected) => {
                    client.on_connected();
                    info!(attempt, connected, "Reconnected");
                    return;
                }
                Err(e) => {
                    client.set_state(ClientState::Failed);
                    warn!(attempt, error = %e, "Reconnection attempt failed");
                }
            }
        }
    }
}

// ============================================================================
// Client - Background Tasks
// ============================================================================

impl Client {
    fn start_background_tasks(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        self.inner.monitor.start(self.quality_handler());

        let weak = Arc::downgrade(&self.inner);
        tasks.push(tokio::spawn(Self::flush_loop(
            weak.clone(),
            self.inner.config.batch_flush_interval,
        )));
        tasks.push(tokio::spawn(Self::completion_loop(
            weak.clone(),
            Arc::clone(&self.inner.completions),
        )));
        tasks.push(tokio::spawn(Self::transport_loop(
            weak,
            Arc::clone(&self.inner.transport_events),
        )));

        debug!(tasks = tasks.len(), "Background tasks started");
    }

    fn quality_handler(&self) -> QualityHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |quality| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let policy = inner.policy.apply(quality);
            inner.batcher.apply_policy(policy);
            inner.quality.send_replace(quality);
            let _ = inner.events.send(ClientEvent::QualityChanged(quality));
        })
    }

    async fn flush_loop(weak: Weak<ClientInner>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.batcher.flush();
        }
    }

    async fn completion_loop(weak: Weak<ClientInner>, completions: SharedReceiver<Completion>) {
        let mut completions = completions.lock().await;

        while let Some(completion) = completions.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            Client { inner }.handle_completion(completion);
        }
    }

    fn handle_completion(&self, completion: Completion) {
        let Completion {
            connection_id,
            messages,
            requeued,
            outcome,
        } = completion;

        match &outcome {
            Ok(latency) => {
                for _ in 0..messages {
                    self.inner.tracker.record(true, *latency);
                }
            }
            Err(e) if e.is_cancelled() => return,
            // Counted once they are delivered or expire.
            Err(e) if requeued => {
                debug!(connection_id = ?connection_id, messages, error = %e, "Send failed, messages re-queued");
            }
            Err(e) => {
                debug!(connection_id = ?connection_id, messages, error = %e, "Send failed");
                for _ in 0..messages {
                    self.inner.tracker.record(false, Duration::ZERO);
                }
            }
        }

        if !requeued {
            let _ = self
                .inner
                .events
                .send(ClientEvent::MetricsUpdated(self.inner.tracker.snapshot()));
        }

        if let Err(e) = outcome
            && e.is_retryable()
        {
            self.attempt_reconnection();
        }
    }

    async fn transport_loop(weak: Weak<ClientInner>, events: SharedReceiver<TransportEvent>) {
        let mut events = events.lock().await;

        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let client = Client { inner };

            match event {
                TransportEvent::Inbound {
                    connection_id,
                    envelope,
                } => {
                    trace!(%connection_id, kind = %envelope.kind, "Inbound message");
                    let _ = client.inner.events.send(ClientEvent::Message(envelope));
                }
                TransportEvent::Dropped {
                    connection_id,
                    reason,
                } => {
                    warn!(%connection_id, %reason, "Pool member dropped");
                    client.attempt_reconnection();
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::timeout;

    use crate::client::reconnect::BackoffConfig;
    use crate::error::Error;
    use crate::network::{InterfaceKind, ManualReachability, PathStatus};
    use crate::protocol::{BatchEnvelope, Envelope};
    use crate::transport::mock::{MockTransport, init_tracing};

    struct Fixture {
        client: Client,
        transport: MockTransport,
        reachability: Arc<ManualReachability>,
    }

    fn fixture(config: ClientConfig, initial: PathStatus) -> Fixture {
        init_tracing();
        let transport = MockTransport::new();
        let reachability = Arc::new(ManualReachability::new(initial));
        let client = Client::builder()
            .config(config)
            .endpoint("ws://mock")
            .transport(Arc::new(transport.clone()))
            .reachability(Arc::clone(&reachability) as Arc<dyn ReachabilityProvider>)
            .backoff_seed(42)
            .build()
            .expect("valid config");

        Fixture {
            client,
            transport,
            reachability,
        }
    }

    /// Batch sizes of every frame written, 1 for single envelopes.
    fn frame_sizes(transport: &MockTransport) -> Vec<usize> {
        transport
            .sent_texts()
            .iter()
            .map(|text| match serde_json::from_str::<BatchEnvelope>(text) {
                Ok(batch) => batch.count,
                Err(_) => 1,
            })
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn wait_for_quality(client: &Client, quality: NetworkQuality) {
        let mut watch = client.quality_watch();
        timeout(Duration::from_secs(2), watch.wait_for(|q| *q == quality))
            .await
            .expect("quality in time")
            .expect("watch open");
    }

    async fn wait_for_state(events: &mut broadcast::Receiver<ClientEvent>, state: ClientState) {
        loop {
            match events.recv().await {
                Ok(ClientEvent::StateChanged(s)) if s == state => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_burst_is_batched_and_delivered() {
        let f = fixture(
            ClientConfig::default().with_batch_flush_interval(Duration::from_millis(10)),
            PathStatus::unknown(),
        );
        f.client.connect().await.expect("connect");
        assert!(f.client.is_connected());

        for i in 0..100 {
            f.client.send(format!("message {i}"), "chat", Priority::Normal);
        }

        wait_until(|| frame_sizes(&f.transport).iter().sum::<usize>() == 100).await;
        let batch_size = f.client.inner.batcher.policy().batch_size;
        assert!(frame_sizes(&f.transport).iter().all(|&n| n <= batch_size));

        wait_until(|| f.client.metrics().total_messages == 100).await;
        let metrics = f.client.metrics();
        assert_eq!(metrics.successful_messages, 100);
        assert_eq!(metrics.failed_messages, 0);

        f.client.disconnect().await;
        assert_eq!(f.client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_quality_change_reconfigures_batching() {
        let f = fixture(
            ClientConfig::default().with_batch_flush_interval(Duration::from_secs(3600)),
            PathStatus::satisfied(InterfaceKind::Wifi),
        );
        f.client.connect().await.expect("connect");
        wait_for_quality(&f.client, NetworkQuality::Wifi).await;

        for i in 0..20 {
            f.client.send(format!("w{i}"), "chat", Priority::Normal);
        }
        assert_eq!(f.client.flush(), 4);
        wait_until(|| frame_sizes(&f.transport).len() == 4).await;
        assert!(frame_sizes(&f.transport).iter().all(|&n| n == 5));

        f.reachability.update(PathStatus::cellular());
        wait_for_quality(&f.client, NetworkQuality::Cellular).await;

        let policy = f.client.inner.batcher.policy();
        assert_eq!(policy.batch_size, 10);
        assert_eq!(policy.compression_level, crate::protocol::CompressionLevel::High);

        for i in 0..20 {
            f.client.send(format!("c{i}"), "chat", Priority::Normal);
        }
        assert_eq!(f.client.flush(), 2);
        wait_until(|| frame_sizes(&f.transport).len() == 6).await;
        assert_eq!(&frame_sizes(&f.transport)[4..], [10, 10]);

        f.client.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_cancels_in_flight_sends() {
        let f = fixture(ClientConfig::default(), PathStatus::unknown());
        f.client.connect().await.expect("connect");
        let mut events = f.client.subscribe();

        f.transport.hold_sends();
        for i in 0..5 {
            f.client.send(format!("urgent {i}"), "command", Priority::Critical);
        }

        let high = f.client.inner.pool.connections()[0].clone();
        wait_until(|| high.active_message_count() == 5).await;

        f.client.disconnect().await;
        assert_eq!(high.active_message_count(), 0);

        f.transport.release_sends();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.transport.sent_texts().is_empty());
        assert_eq!(f.client.metrics().total_messages, 0);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ClientEvent::MetricsUpdated(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_reset() {
        let backoff = BackoffConfig {
            jitter_fraction: 0.0,
            ..BackoffConfig::default()
        };
        let f = fixture(
            ClientConfig::default().with_pool_size(1).with_backoff(backoff),
            PathStatus::unknown(),
        );
        let mut events = f.client.subscribe();

        f.transport.fail_next_opens(3);
        let err = f.client.connect().await.expect_err("first attempt fails");
        assert!(err.is_connection_error());
        assert_eq!(f.client.state(), ClientState::Failed);

        timeout(Duration::from_secs(60), wait_for_state(&mut events, ClientState::Connected))
            .await
            .expect("reconnected");

        assert_eq!(f.transport.open_count(), 4);
        assert!(f.client.is_connected());
        assert_eq!(
            f.client.inner.reconnect.lock().current_delay(),
            backoff.initial_delay
        );

        f.client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connection_reconnects() {
        let f = fixture(ClientConfig::default().with_pool_size(2), PathStatus::unknown());
        f.client.connect().await.expect("connect");
        let mut events = f.client.subscribe();

        f.transport.drop_connections();
        timeout(Duration::from_secs(5), wait_for_state(&mut events, ClientState::Connecting))
            .await
            .expect("reconnection started");
        timeout(Duration::from_secs(60), wait_for_state(&mut events, ClientState::Connected))
            .await
            .expect("reconnected");

        assert_eq!(f.transport.open_count(), 4);
        assert_eq!(f.client.inner.pool.connected_count(), 2);

        f.client.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_discards_stale_completions() {
        let f = fixture(ClientConfig::default().with_pool_size(1), PathStatus::unknown());
        f.client.connect().await.expect("connect");
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queued without yielding, so the completion task never sees it.
        let stale = f.client.inner.batcher.completion_sender();
        stale
            .send(Completion {
                connection_id: None,
                messages: 4,
                requeued: false,
                outcome: Err(Error::send_failure("late write error")),
            })
            .expect("channel open");
        f.client.disconnect().await;

        let mut events = f.client.subscribe();
        f.client.connect().await.expect("reconnect");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.client.metrics().total_messages, 0);
        assert!(f.client.is_connected());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ClientEvent::StateChanged(ClientState::Failed)));
            assert!(!matches!(event, ClientEvent::MetricsUpdated(_)));
        }

        f.client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeued_batch_counts_once() {
        let f = fixture(ClientConfig::default().with_pool_size(1), PathStatus::cellular());
        f.client.connect().await.expect("connect");
        wait_for_quality(&f.client, NetworkQuality::Cellular).await;
        assert!(f.client.inner.batcher.policy().enable_retry_queue);

        f.transport.fail_next_sends(1);
        for i in 0..3 {
            f.client.send(format!("r{i}"), "chat", Priority::Normal);
        }
        assert_eq!(f.client.flush(), 1);

        timeout(
            Duration::from_secs(60),
            wait_until(|| f.client.metrics().successful_messages == 3),
        )
        .await
        .expect("delivered after reconnect");

        let metrics = f.client.metrics();
        assert_eq!(metrics.total_messages, 3);
        assert_eq!(metrics.failed_messages, 0);
        assert!((f.client.performance_report().success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(frame_sizes(&f.transport), [3]);

        f.client.disconnect().await;
    }

    #[tokio::test]
    async fn test_inbound_messages_are_published() {
        let f = fixture(ClientConfig::default().with_pool_size(1), PathStatus::unknown());
        f.client.connect().await.expect("connect");
        let mut events = f.client.subscribe();

        let envelope = Message::new("reply", "pong", ClientId::new("server"), Priority::Normal).to_envelope();
        f.transport.push_inbound(&envelope.encode().expect("encode"));

        let received = timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(ClientEvent::Message(envelope)) = events.recv().await {
                    return envelope;
                }
            }
        })
        .await
        .expect("message in time");
        assert_eq!(received, envelope);

        f.client.disconnect().await;
    }

    #[tokio::test]
    async fn test_pending_messages_survive_disconnect() {
        let f = fixture(
            ClientConfig::default().with_batch_flush_interval(Duration::from_millis(10)),
            PathStatus::unknown(),
        );

        f.client.send("early", "chat", Priority::Low);
        f.client.send("early too", "chat", Priority::High);
        assert_eq!(f.client.pending_messages(), 2);

        f.client.connect().await.expect("connect");
        wait_until(|| f.client.pending_messages() == 0).await;
        wait_until(|| frame_sizes(&f.transport).iter().sum::<usize>() == 2).await;

        let text = &f.transport.sent_texts()[0];
        let batch: BatchEnvelope = serde_json::from_str(text).expect("batch");
        let envelopes: Vec<Envelope> = batch.into_envelopes().expect("envelopes");
        assert_eq!(envelopes[0].content, "early too");

        f.client.disconnect().await;
        f.client.send("later", "chat", Priority::Normal);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.client.pending_messages(), 1);

        f.client.connect().await.expect("reconnect");
        wait_until(|| f.client.pending_messages() == 0).await;
        f.client.disconnect().await;
    }

    #[tokio::test]
    async fn test_performance_report() {
        let f = fixture(
            ClientConfig::default().with_batch_flush_interval(Duration::from_millis(10)),
            PathStatus::satisfied(InterfaceKind::Ethernet),
        );
        let idle = f.client.performance_report();
        assert!(!idle.connected);
        assert!(!idle.optimal);
        assert!(idle.success_rate.abs() < f64::EPSILON);

        f.client.connect().await.expect("connect");
        wait_for_quality(&f.client, NetworkQuality::Ethernet).await;

        for i in 0..10 {
            f.client.send(format!("{i}"), "chat", Priority::Normal);
        }
        wait_until(|| f.client.metrics().total_messages == 10).await;

        let report = f.client.performance_report();
        assert!(report.connected);
        assert_eq!(report.quality, NetworkQuality::Ethernet);
        assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.optimal);
        assert!(f.client.is_performance_optimal());
        assert_eq!(report.connections.len(), 3);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["quality"], "ethernet");
        assert_eq!(json["connections"][0]["priority"], "high");

        f.client.disconnect().await;
    }
}
