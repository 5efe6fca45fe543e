//! Pooled connection and its event loop.
//!
//! Each [`Connection`] owns at most one open socket at a time. Opening a
//! socket starts a session: an event loop task plus the correlation map that
//! ties queued writes to their waiting callers.
//!
//! # Event Loop
//!
//! The session task multiplexes:
//!
//! - Inbound frames, decoded into [`TransportEvent::Inbound`]
//! - Outbound writes queued by [`Connection::send`] and [`Connection::send_batch`]
//! - The shutdown signal raised by [`Connection::disconnect`]
//!
//! A socket that ends while the connection is `Connected` marks it `Failed`
//! and reports [`TransportEvent::Dropped`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Batch, Message, decode_frame};

use super::socket::{Frame, FrameSink, FrameStream, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// Smoothing factor for the latency moving average.
const LATENCY_EWMA_ALPHA: f64 = 0.1;

/// Time the event loop gets to close its socket before being aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Map of write IDs to waiting callers.
type CorrelationMap = FxHashMap<u64, PendingWrite>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Socket handshake in progress.
    Connecting,
    /// Socket open.
    Connected,
    /// Closed by `disconnect()`.
    Disconnected,
    /// Handshake failed or the socket dropped.
    Failed,
}

// ============================================================================
// ConnectionPriority
// ============================================================================

/// Routing class of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPriority {
    /// General traffic.
    #[default]
    Normal,
    /// Preferred route for critical messages.
    High,
}

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Per-connection parameters shared by every pool member.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Service URL.
    pub endpoint: String,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Deadline for one queued write.
    pub send_timeout: Duration,
}

// ============================================================================
// ConnectionStats
// ============================================================================

/// Point-in-time view of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Routing class.
    pub priority: ConnectionPriority,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Latency moving average in milliseconds.
    pub average_latency_ms: f64,
    /// Messages currently in flight.
    pub active_messages: usize,
}

// ============================================================================
// Internals
// ============================================================================

/// A caller waiting for its write.
///
/// Once `started` is set the frame may be on the wire, so the caller's
/// timeout no longer applies and it waits for the sink's answer.
struct PendingWrite {
    done: oneshot::Sender<Result<Duration>>,
    started: bool,
}

/// A write queued for the event loop.
struct SendCommand {
    id: u64,
    frame: Frame,
    queued_at: Instant,
}

/// One open socket and the task driving it.
struct Session {
    epoch: u64,
    command_tx: mpsc::UnboundedSender<SendCommand>,
    correlation: Arc<Mutex<CorrelationMap>>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

struct ConnectionInner {
    id: ConnectionId,
    priority: ConnectionPriority,
    settings: ConnectionSettings,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<TransportEvent>,

    state: Mutex<ConnectionState>,
    average_latency: Mutex<Duration>,
    active: AtomicUsize,
    next_send_id: AtomicU64,
    next_epoch: AtomicU64,
    session: Mutex<Option<Session>>,

    /// Serializes `connect` and `disconnect`.
    lifecycle: tokio::sync::Mutex<()>,
}

/// Counts messages in flight for as long as it lives.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    count: usize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, count: usize) -> Self {
        counter.fetch_add(count, Ordering::SeqCst);
        Self { counter, count }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(self.count, Ordering::SeqCst);
    }
}

/// Why an event loop stopped.
enum LoopExit {
    Shutdown,
    Dropped(Error),
}

// ============================================================================
// Connection
// ============================================================================

/// One member of the connection pool.
///
/// Cheap to clone; clones share the same socket and statistics.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::new(ConnectionId::new(0), ConnectionPriority::High, settings, transport, events_tx);
/// connection.connect().await?;
/// let latency = connection.send(&message).await?;
/// connection.disconnect().await;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("priority", &self.inner.priority)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates an idle connection.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        priority: ConnectionPriority,
        settings: ConnectionSettings,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                priority,
                settings,
                transport,
                events,
                state: Mutex::new(ConnectionState::Idle),
                average_latency: Mutex::new(Duration::ZERO),
                active: AtomicUsize::new(0),
                next_send_id: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
                session: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the routing class.
    #[inline]
    #[must_use]
    pub fn priority(&self) -> ConnectionPriority {
        self.inner.priority
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the latency moving average of successful writes.
    #[inline]
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        *self.inner.average_latency.lock()
    }

    /// Returns the number of messages currently in flight.
    #[inline]
    #[must_use]
    pub fn active_message_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of this connection's statistics.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            id: self.id(),
            priority: self.priority(),
            state: self.state(),
            average_latency_ms: self.average_latency().as_secs_f64() * 1000.0,
            active_messages: self.active_message_count(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the socket.
    ///
    /// Returns immediately if already connected.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the transport refuses
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.is_connected() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        debug!(connection_id = %self.id(), endpoint = %self.inner.settings.endpoint, "Connecting");

        let connect_timeout = self.inner.settings.connect_timeout;
        let opened = timeout(
            connect_timeout,
            self.inner.transport.open(&self.inner.settings.endpoint),
        )
        .await;

        let (sink, stream) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Failed);
                warn!(connection_id = %self.id(), error = %e, "Connection failed");
                return Err(match e {
                    Error::Connection { .. } => e,
                    other => Error::connection(other.to_string()),
                });
            }
            Err(_) => {
                self.set_state(ConnectionState::Failed);
                warn!(connection_id = %self.id(), "Connection handshake timed out");
                return Err(Error::connection_timeout(connect_timeout.as_millis() as u64));
            }
        };

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let shutdown = Arc::new(Notify::new());

        {
            // Held across the spawn so an immediately-ending socket sees
            // this session when it exits.
            let mut session = self.inner.session.lock();
            self.set_state(ConnectionState::Connected);

            let handle = tokio::spawn(Self::run_event_loop(
                Arc::clone(&self.inner),
                epoch,
                sink,
                stream,
                command_rx,
                Arc::clone(&correlation),
                Arc::clone(&shutdown),
            ));

            *session = Some(Session {
                epoch,
                command_tx,
                correlation,
                shutdown,
                handle,
            });
        }

        info!(connection_id = %self.id(), priority = ?self.priority(), "Connection established");
        Ok(())
    }

    /// Closes the socket.
    ///
    /// Every write still waiting for completion resolves with
    /// [`Error::Cancelled`] before this returns; none resolves differently
    /// afterwards.
    pub async fn disconnect(&self) {
        let session = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.set_state(ConnectionState::Disconnected);
            self.inner.session.lock().take()
        };

        let Some(session) = session else {
            return;
        };

        let cancelled = Self::fail_pending(&session.correlation, || Error::Cancelled);
        session.shutdown.notify_one();
        drop(session.command_tx);

        let mut handle = session.handle;
        if timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
            warn!(connection_id = %self.id(), "Event loop did not stop in time, aborting");
            handle.abort();
        }

        info!(connection_id = %self.id(), cancelled, "Connection closed");
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends one message and returns the time until the write completed.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open
    /// - [`Error::SendTimeout`] if the write is still queued after
    ///   `send_timeout`; a write the socket already took is awaited instead
    /// - [`Error::SendFailure`] if the socket rejects the write
    /// - [`Error::Cancelled`] if `disconnect()` ran first
    pub async fn send(&self, message: &Message) -> Result<Duration> {
        let text = message.to_envelope().encode()?;
        self.transmit(Frame::Text(text), 1).await
    }

    /// Sends a sealed batch as one frame.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_batch(&self, batch: &Batch) -> Result<Duration> {
        let text = batch.encode()?;
        self.transmit(Frame::Text(text), batch.len()).await
    }

    async fn transmit(&self, frame: Frame, messages: usize) -> Result<Duration> {
        let _in_flight = InFlight::enter(&self.inner.active, messages);

        let (command_tx, correlation) = {
            let session = self.inner.session.lock();
            match session.as_ref() {
                Some(session) => (session.command_tx.clone(), Arc::clone(&session.correlation)),
                None => {
                    return Err(Error::not_connected(format!("{} has no open socket", self.id())));
                }
            }
        };

        let id = self.inner.next_send_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, mut done_rx) = oneshot::channel();
        correlation.lock().insert(
            id,
            PendingWrite {
                done: done_tx,
                started: false,
            },
        );

        let command = SendCommand {
            id,
            frame,
            queued_at: Instant::now(),
        };
        if command_tx.send(command).is_err() {
            correlation.lock().remove(&id);
            return Err(Error::ConnectionClosed);
        }

        let send_timeout = self.inner.settings.send_timeout;
        let answer = match timeout(send_timeout, &mut done_rx).await {
            Ok(answer) => answer,
            Err(_) => {
                let abandoned = {
                    let mut pending = correlation.lock();
                    let unstarted = pending.get(&id).is_some_and(|write| !write.started);
                    if unstarted {
                        pending.remove(&id);
                    }
                    unstarted
                };

                if abandoned {
                    warn!(connection_id = %self.id(), timeout_ms = send_timeout.as_millis() as u64, "Send timed out");
                    return Err(Error::send_timeout(self.id(), send_timeout.as_millis() as u64));
                }

                debug!(connection_id = %self.id(), id, "Write already on the socket, waiting for its result");
                done_rx.await
            }
        };

        match answer {
            Ok(result) => {
                if let Ok(latency) = &result {
                    self.record_latency(*latency);
                }
                result
            }
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Folds a successful write latency into the moving average.
    pub(crate) fn record_latency(&self, latency: Duration) {
        let mut average = self.inner.average_latency.lock();
        *average = average.mul_f64(1.0 - LATENCY_EWMA_ALPHA) + latency.mul_f64(LATENCY_EWMA_ALPHA);
        trace!(connection_id = %self.inner.id, average_ms = average.as_millis() as u64, "Latency updated");
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock() = state;
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    async fn run_event_loop(
        inner: Arc<ConnectionInner>,
        epoch: u64,
        mut sink: Box<dyn FrameSink>,
        mut stream: Box<dyn FrameStream>,
        mut command_rx: mpsc::UnboundedReceiver<SendCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        shutdown: Arc<Notify>,
    ) {
        let connection_id = inner.id;

        let exit = loop {
            tokio::select! {
                biased;

                () = shutdown.notified() => break LoopExit::Shutdown,

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        break LoopExit::Shutdown;
                    };
                    match Self::handle_send_command(command, &mut sink, &correlation, &shutdown).await {
                        Ok(true) => {}
                        Ok(false) => break LoopExit::Shutdown,
                        Err(e) => break LoopExit::Dropped(e),
                    }
                }

                frame = stream.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => Self::handle_incoming(&inner, &text),
                    Some(Ok(Frame::Binary(data))) => {
                        trace!(%connection_id, len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Frame::Close)) | None => break LoopExit::Dropped(Error::ConnectionClosed),
                    Some(Err(e)) => break LoopExit::Dropped(e),
                },
            }
        };

        match exit {
            LoopExit::Shutdown => {
                if timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                    debug!(%connection_id, "Socket close timed out");
                }
                Self::fail_pending(&correlation, || Error::Cancelled);
            }
            LoopExit::Dropped(error) => {
                Self::fail_pending(&correlation, || Error::ConnectionClosed);

                let is_current = {
                    let mut session = inner.session.lock();
                    if session.as_ref().is_some_and(|s| s.epoch == epoch) {
                        session.take();
                        true
                    } else {
                        false
                    }
                };

                if is_current {
                    {
                        let mut state = inner.state.lock();
                        if *state == ConnectionState::Connected {
                            *state = ConnectionState::Failed;
                        }
                    }
                    warn!(%connection_id, error = %error, "Connection dropped");
                    let _ = inner.events.send(TransportEvent::Dropped {
                        connection_id,
                        reason: error.to_string(),
                    });
                }
            }
        }

        debug!(%connection_id, epoch, "Event loop terminated");
    }

    /// Writes one queued frame.
    ///
    /// Returns `Ok(false)` if shutdown interrupted the write and `Err` if
    /// the socket failed.
    async fn handle_send_command(
        command: SendCommand,
        sink: &mut Box<dyn FrameSink>,
        correlation: &Mutex<CorrelationMap>,
        shutdown: &Notify,
    ) -> Result<bool> {
        let SendCommand { id, frame, queued_at } = command;

        // Claimed under the lock so the caller's timeout cannot race the write.
        let claimed = {
            let mut pending = correlation.lock();
            match pending.get_mut(&id) {
                Some(write) => {
                    write.started = true;
                    true
                }
                None => false,
            }
        };
        if !claimed {
            trace!(id, "Skipping abandoned write");
            return Ok(true);
        }

        let result = tokio::select! {
            biased;
            () = shutdown.notified() => return Ok(false),
            result = sink.send(frame) => result,
        };

        let done_tx = correlation.lock().remove(&id).map(|pending| pending.done);
        match result {
            Ok(()) => {
                if let Some(tx) = done_tx {
                    let _ = tx.send(Ok(queued_at.elapsed()));
                }
                trace!(id, "Frame written");
                Ok(true)
            }
            Err(e) => {
                if let Some(tx) = done_tx {
                    let _ = tx.send(Err(Error::send_failure(e.to_string())));
                }
                Err(e)
            }
        }
    }

    /// Decodes an inbound text frame and forwards its envelopes.
    fn handle_incoming(inner: &ConnectionInner, text: &str) {
        match decode_frame(text) {
            Ok(envelopes) => {
                for envelope in envelopes {
                    let _ = inner.events.send(TransportEvent::Inbound {
                        connection_id: inner.id,
                        envelope,
                    });
                }
            }
            Err(e) => {
                warn!(connection_id = %inner.id, error = %e, "Dropping undecodable frame");
            }
        }
    }

    /// Resolves every waiting write with an error and returns how many there were.
    fn fail_pending(correlation: &Mutex<CorrelationMap>, error: impl Fn() -> Error) -> usize {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, write) in pending {
            let _ = write.done.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Failed pending writes");
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn set_load(&self, latency: Duration, active: usize) {
        *self.inner.average_latency.lock() = latency;
        self.inner.active.store(active, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::ClientId;
    use crate::protocol::{CompressionLevel, Priority};
    use crate::transport::mock::MockTransport;

    fn settings(send_timeout: Duration) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: "ws://mock".into(),
            connect_timeout: Duration::from_secs(1),
            send_timeout,
        }
    }

    fn connection(
        transport: &MockTransport,
        send_timeout: Duration,
    ) -> (Connection, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            ConnectionId::new(0),
            ConnectionPriority::High,
            settings(send_timeout),
            Arc::new(transport.clone()),
            tx,
        );
        (connection, rx)
    }

    fn message(text: &str) -> Message {
        Message::new("chat", text, ClientId::new("test"), Priority::Normal)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_secs(1));
        assert_eq!(connection.state(), ConnectionState::Idle);

        connection.connect().await.expect("connect");
        assert!(connection.is_connected());
        connection.connect().await.expect("second connect is a no-op");
        assert_eq!(transport.open_count(), 1);

        connection.send(&message("hi")).await.expect("send");
        assert_eq!(connection.active_message_count(), 0);

        let sent = transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("\"content\":\"hi\""));

        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_batch_counts_messages() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_secs(1));
        connection.connect().await.expect("connect");

        transport.hold_sends();
        let batch = Batch::seal(vec![message("a"), message("b"), message("c")], CompressionLevel::Low);
        let sender = connection.clone();
        let task = tokio::spawn(async move { sender.send_batch(&batch).await });

        wait_until(|| connection.active_message_count() == 3).await;
        transport.release_sends();

        task.await.expect("join").expect("batch sent");
        assert_eq!(connection.active_message_count(), 0);
        assert_eq!(transport.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_failed() {
        let transport = MockTransport::new();
        transport.fail_next_opens(1);
        let (connection, _events) = connection(&transport, Duration::from_secs(1));

        let err = connection.connect().await.expect_err("connect should fail");
        assert!(err.is_connection_error());
        assert_eq!(connection.state(), ConnectionState::Failed);

        connection.connect().await.expect("retry succeeds");
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_send_without_socket() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_secs(1));

        let err = connection.send(&message("x")).await.expect_err("not connected");
        assert!(matches!(err, Error::NotConnected { .. }));
        assert_eq!(connection.active_message_count(), 0);
    }

    #[tokio::test]
    async fn test_send_timeout_abandons_queued_write() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_millis(50));
        connection.connect().await.expect("connect");

        transport.hold_sends();
        let sender = connection.clone();
        let first = tokio::spawn(async move { sender.send(&message("blocking")).await });
        wait_until(|| connection.active_message_count() == 1).await;

        let err = connection.send(&message("queued")).await.expect_err("timeout");
        assert!(matches!(err, Error::SendTimeout { .. }));
        assert!(err.is_retryable());
        assert_eq!(connection.active_message_count(), 1);

        transport.release_sends();
        first.await.expect("join").expect("started write completes");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sent = transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("blocking"));

        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_started_write_outlives_send_timeout() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_millis(50));
        connection.connect().await.expect("connect");
        transport.hold_sends();

        let slow = message("slow");
        let mut send = tokio_test::task::spawn(connection.send(&slow));
        tokio_test::assert_pending!(send.poll());

        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio_test::assert_pending!(send.poll());
        assert_eq!(connection.active_message_count(), 1);

        transport.release_sends();
        wait_until(|| send.is_woken()).await;
        let latency = tokio_test::assert_ready_ok!(send.poll());
        assert!(latency >= Duration::from_millis(150));
        drop(send);

        assert_eq!(transport.sent_texts().len(), 1);
        assert_eq!(connection.active_message_count(), 0);

        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_cancels_in_flight() {
        let transport = MockTransport::new();
        let (connection, _events) = connection(&transport, Duration::from_secs(5));
        connection.connect().await.expect("connect");
        transport.hold_sends();

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.send(&message(&format!("m{i}"))).await })
            })
            .collect();

        wait_until(|| connection.active_message_count() == 5).await;
        connection.disconnect().await;

        for task in tasks {
            let result = task.await.expect("join");
            assert!(matches!(result, Err(Error::Cancelled)));
        }
        assert_eq!(connection.active_message_count(), 0);

        transport.release_sends();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_remote_close_reports_drop() {
        let transport = MockTransport::new();
        let (connection, mut events) = connection(&transport, Duration::from_secs(1));
        connection.connect().await.expect("connect");

        transport.drop_connections();

        match events.recv().await {
            Some(TransportEvent::Dropped { connection_id, .. }) => {
                assert_eq!(connection_id, ConnectionId::new(0));
            }
            other => panic!("expected drop, got {other:?}"),
        }
        assert_eq!(connection.state(), ConnectionState::Failed);

        let err = connection.send(&message("late")).await.expect_err("socket gone");
        assert!(matches!(err, Error::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_write_failure_reports_drop() {
        let transport = MockTransport::new();
        let (connection, mut events) = connection(&transport, Duration::from_secs(1));
        connection.connect().await.expect("connect");

        transport.fail_next_sends(1);
        let err = connection.send(&message("x")).await.expect_err("write fails");
        assert!(matches!(err, Error::SendFailure { .. }));

        assert!(matches!(events.recv().await, Some(TransportEvent::Dropped { .. })));
        assert_eq!(connection.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_report_drop() {
        let transport = MockTransport::new();
        let (connection, mut events) = connection(&transport, Duration::from_secs(1));
        connection.connect().await.expect("connect");

        connection.disconnect().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_frames_are_decoded() {
        let transport = MockTransport::new();
        let (connection, mut events) = connection(&transport, Duration::from_secs(1));
        connection.connect().await.expect("connect");

        let envelope = message("from server").to_envelope();
        transport.push_inbound(&envelope.encode().expect("encode"));
        transport.push_inbound("not json");

        match events.recv().await {
            Some(TransportEvent::Inbound { envelope: received, .. }) => {
                assert_eq!(received, envelope);
            }
            other => panic!("expected inbound, got {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
        assert!(connection.is_connected());

        connection.disconnect().await;
    }

    #[test]
    fn test_latency_moving_average() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            ConnectionId::new(1),
            ConnectionPriority::Normal,
            settings(Duration::from_secs(1)),
            Arc::new(MockTransport::new()),
            tx,
        );

        let millis = |c: &Connection| c.average_latency().as_secs_f64() * 1000.0;

        assert_eq!(connection.average_latency(), Duration::ZERO);
        connection.record_latency(Duration::from_millis(100));
        assert!((millis(&connection) - 10.0).abs() < 1e-3);
        connection.record_latency(Duration::from_millis(100));
        assert!((millis(&connection) - 19.0).abs() < 1e-3);
    }

    #[test]
    fn test_stats_snapshot() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            ConnectionId::new(2),
            ConnectionPriority::Normal,
            settings(Duration::from_secs(1)),
            Arc::new(MockTransport::new()),
            tx,
        );
        connection.set_load(Duration::from_millis(250), 4);

        let stats = connection.stats();
        assert_eq!(stats.id, ConnectionId::new(2));
        assert_eq!(stats.state, ConnectionState::Idle);
        assert!((stats.average_latency_ms - 250.0).abs() < f64::EPSILON);
        assert_eq!(stats.active_messages, 4);
    }
}
