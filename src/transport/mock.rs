//! In-memory transport for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

use super::socket::{Frame, FrameSink, FrameStream, SocketPair, Transport};

/// Installs a test log subscriber once; later calls are ignored.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct MockState {
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    failing_sends: AtomicUsize,
    held: watch::Sender<bool>,
    sent: Mutex<Vec<Frame>>,
    peers: Mutex<Vec<mpsc::UnboundedSender<Result<Frame>>>>,
}

/// Scriptable transport: refuse opens, stall or fail writes, inject frames.
#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                opens: AtomicUsize::new(0),
                failing_opens: AtomicUsize::new(0),
                failing_sends: AtomicUsize::new(0),
                held: watch::channel(false).0,
                sent: Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn fail_next_opens(&self, count: usize) {
        self.state.failing_opens.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_sends(&self, count: usize) {
        self.state.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Stalls every write until [`MockTransport::release_sends`].
    pub(crate) fn hold_sends(&self) {
        self.state.held.send_replace(true);
    }

    pub(crate) fn release_sends(&self) {
        self.state.held.send_replace(false);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_frames(&self) -> Vec<Frame> {
        self.state.sent.lock().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Delivers a text frame to every open socket.
    pub(crate) fn push_inbound(&self, text: &str) {
        for peer in self.state.peers.lock().iter() {
            let _ = peer.send(Ok(Frame::Text(text.to_string())));
        }
    }

    /// Closes every open socket from the remote side.
    pub(crate) fn drop_connections(&self) {
        for peer in self.state.peers.lock().drain(..) {
            let _ = peer.send(Ok(Frame::Close));
        }
    }
}

/// Decrements `counter` if positive; returns whether it did.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _endpoint: &str) -> Result<SocketPair> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.state.failing_opens) {
            return Err(Error::connection("mock refused connection"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.peers.lock().push(tx);

        Ok((
            Box::new(MockSink {
                state: Arc::clone(&self.state),
            }),
            Box::new(MockStream { rx }),
        ))
    }
}

struct MockSink {
    state: Arc<MockState>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let mut held = self.state.held.subscribe();
        loop {
            let is_held = *held.borrow_and_update();
            if !is_held {
                break;
            }
            if held.changed().await.is_err() {
                return Err(Error::ConnectionClosed);
            }
        }

        if take_one(&self.state.failing_sends) {
            return Err(Error::send_failure("mock write failed"));
        }

        self.state.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await
    }
}
