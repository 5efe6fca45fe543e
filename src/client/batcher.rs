//! Priority batching of outbound messages.
//!
//! Critical messages skip the queue and go straight to the pool. Everything
//! else waits in a pending list until the next [`MessageBatcher::flush`],
//! which orders the list by priority, cuts it into batches of the current
//! policy's size, seals them, and sends each one on its own task.
//!
//! # Completions
//!
//! Every send ends in exactly one [`Completion`] on the channel given to
//! [`MessageBatcher::new`]. When the retry queue is enabled, messages from a
//! failed batch go back to the front of the pending list and the completion
//! is marked `requeued`. Messages older than the configured lifetime are
//! discarded instead and reported as [`Error::Expired`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::network::QualityPolicy;
use crate::protocol::{Batch, Message, Priority};
use crate::transport::{Connection, ConnectionPool};

// ============================================================================
// Completion
// ============================================================================

/// Outcome of one send.
#[derive(Debug)]
pub struct Completion {
    /// Connection that carried the send, if one was available.
    pub connection_id: Option<ConnectionId>,
    /// Number of messages the send carried.
    pub messages: usize,
    /// The messages went back to the pending list; a failure is not final.
    pub requeued: bool,
    /// Write latency, or why the send failed.
    pub outcome: Result<Duration>,
}

// ============================================================================
// RetryQueue
// ============================================================================

/// Pending list shared with send tasks.
#[derive(Clone)]
struct RetryQueue {
    pending: Arc<Mutex<VecDeque<Message>>>,
    message_ttl: Duration,
    completions: mpsc::UnboundedSender<Completion>,
}

impl RetryQueue {
    /// Puts messages back at the front, dropping expired ones.
    fn requeue(&self, messages: Vec<Message>) {
        let now = Utc::now();
        let (live, expired): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .partition(|m| m.age(now) <= self.message_ttl);

        self.report_expired(expired.len());

        let requeued = live.len();
        let mut pending = self.pending.lock();
        for message in live.into_iter().rev() {
            pending.push_front(message);
        }
        if requeued > 0 {
            debug!(requeued, pending = pending.len(), "Messages re-queued");
        }
    }

    /// Drops pending messages older than the lifetime.
    fn prune_expired(&self) {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|m| m.age(now) <= self.message_ttl);

        let expired = before - pending.len();
        drop(pending);
        self.report_expired(expired);
    }

    fn report_expired(&self, count: usize) {
        if count == 0 {
            return;
        }
        warn!(count, "Discarding expired messages");
        let _ = self.completions.send(Completion {
            connection_id: None,
            messages: count,
            requeued: false,
            outcome: Err(Error::expired(self.message_ttl.as_millis() as u64)),
        });
    }
}

// ============================================================================
// MessageBatcher
// ============================================================================

/// Holds outbound messages and sends them in priority-ordered batches.
///
/// # Example
///
/// ```ignore
/// let (tx, mut completions) = mpsc::unbounded_channel();
/// let batcher = MessageBatcher::new(pool, QualityPolicy::default(), Duration::from_secs(60), tx);
///
/// batcher.enqueue(message);
/// batcher.flush();
/// let completion = completions.recv().await;
/// ```
pub struct MessageBatcher {
    pool: Arc<ConnectionPool>,
    queue: RetryQueue,
    policy: RwLock<QualityPolicy>,
    completions: mpsc::UnboundedSender<Completion>,
    paused: Arc<AtomicBool>,
    in_flight: Mutex<JoinSet<()>>,
}

impl fmt::Debug for MessageBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBatcher")
            .field("pending", &self.pending_len())
            .field("policy", &self.policy())
            .finish_non_exhaustive()
    }
}

impl MessageBatcher {
    /// Creates a batcher sending through `pool`.
    #[must_use]
    pub fn new(
        pool: Arc<ConnectionPool>,
        policy: QualityPolicy,
        message_ttl: Duration,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            pool,
            queue: RetryQueue {
                pending: Arc::new(Mutex::new(VecDeque::new())),
                message_ttl,
                completions: completions.clone(),
            },
            policy: RwLock::new(policy),
            completions,
            paused: Arc::new(AtomicBool::new(false)),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the number of messages waiting for a flush.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.pending.lock().len()
    }

    /// Returns the active batching policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> QualityPolicy {
        *self.policy.read()
    }

    /// Replaces the batching policy used by later flushes.
    pub fn apply_policy(&self, policy: QualityPolicy) {
        *self.policy.write() = policy;
        debug!(?policy, "Batcher policy updated");
    }

    // ========================================================================
    // Queueing
    // ========================================================================

    /// Accepts a message.
    ///
    /// Critical messages are sent immediately; all others wait for the next
    /// flush.
    pub fn enqueue(&self, message: Message) {
        if message.priority().bypasses_batching() {
            self.send_now(message);
            return;
        }

        let mut pending = self.queue.pending.lock();
        pending.push_back(message);
        trace!(pending = pending.len(), "Message queued");
    }

    /// Sends all pending messages and returns the number of batches sent.
    pub fn flush(&self) -> usize {
        if self.paused.load(Ordering::SeqCst) {
            return 0;
        }

        let policy = self.policy();

        if self.pool.connected_count() == 0 {
            if policy.enable_retry_queue {
                self.queue.prune_expired();
                trace!(pending = self.pending_len(), "No connection, holding messages");
            } else {
                let dropped: Vec<_> = self.queue.pending.lock().drain(..).collect();
                if !dropped.is_empty() {
                    warn!(count = dropped.len(), "No connection, dropping messages");
                    self.report(None, dropped.len(), false, Err(Error::not_connected("no connected pool member")));
                }
            }
            return 0;
        }

        let batches = self.take_batches(policy);
        let count = batches.len();

        for batch in batches {
            match self.pool.select_optimal() {
                Some(connection) => self.spawn_batch(connection, batch, policy.enable_retry_queue),
                None => {
                    let messages = batch.len();
                    let retry = policy.enable_retry_queue;
                    if retry {
                        self.queue.requeue(batch.into_messages());
                    }
                    self.report(None, messages, retry, Err(Error::not_connected("no connected pool member")));
                }
            }
        }

        if count > 0 {
            debug!(batches = count, batch_size = policy.batch_size, "Flushed");
        }
        count
    }

    /// Drains the pending list into sealed, priority-ordered batches.
    pub(crate) fn take_batches(&self, policy: QualityPolicy) -> Vec<Batch> {
        let mut messages: Vec<Message> = self.queue.pending.lock().drain(..).collect();
        if messages.is_empty() {
            return Vec::new();
        }

        messages.sort_by(Message::batch_order);

        let size = policy.batch_size.max(1);
        let mut batches = Vec::with_capacity(messages.len().div_ceil(size));
        let mut messages = messages.into_iter().peekable();
        while messages.peek().is_some() {
            let chunk: Vec<Message> = messages.by_ref().take(size).collect();
            batches.push(Batch::seal(chunk, policy.compression_level));
        }
        batches
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stops flushing; batches not yet written go back to the pending list.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes flushing.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Waits for every spawned send to finish.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.in_flight.lock());
        while tasks.join_next().await.is_some() {}
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn send_now(&self, message: Message) {
        let Some(connection) = self.pool.select_for(Priority::Critical) else {
            warn!(kind = message.kind(), "No connection for critical message");
            self.report(None, 1, false, Err(Error::not_connected("no connected pool member")));
            return;
        };

        let completions = self.completions.clone();
        self.spawn(async move {
            let connection_id = connection.id();
            let outcome = connection.send(&message).await;
            if let Err(e) = &outcome {
                debug!(%connection_id, error = %e, "Critical send failed");
            }
            let _ = completions.send(Completion {
                connection_id: Some(connection_id),
                messages: 1,
                requeued: false,
                outcome,
            });
        });
    }

    fn spawn_batch(&self, connection: Connection, batch: Batch, retry: bool) {
        let completions = self.completions.clone();
        let queue = self.queue.clone();
        let paused = Arc::clone(&self.paused);

        self.spawn(async move {
            if paused.load(Ordering::SeqCst) {
                queue.requeue(batch.into_messages());
                return;
            }

            let connection_id = connection.id();
            let messages = batch.len();
            let outcome = connection.send_batch(&batch).await;
            let mut requeued = false;

            match &outcome {
                Ok(latency) => {
                    trace!(%connection_id, batch_id = %batch.id(), messages, latency_ms = latency.as_millis() as u64, "Batch delivered");
                }
                Err(e) if e.is_cancelled() => {
                    debug!(%connection_id, batch_id = %batch.id(), "Batch cancelled");
                }
                Err(e) => {
                    warn!(%connection_id, batch_id = %batch.id(), error = %e, retry, "Batch failed");
                    if retry {
                        queue.requeue(batch.into_messages());
                        requeued = true;
                    }
                }
            }

            let _ = completions.send(Completion {
                connection_id: Some(connection_id),
                messages,
                requeued,
                outcome,
            });
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.in_flight.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    fn report(
        &self,
        connection_id: Option<ConnectionId>,
        messages: usize,
        requeued: bool,
        outcome: Result<Duration>,
    ) {
        let _ = self.completions.send(Completion {
            connection_id,
            messages,
            requeued,
            outcome,
        });
    }

    #[cfg(test)]
    pub(crate) fn completion_sender(&self) -> mpsc::UnboundedSender<Completion> {
        self.completions.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
