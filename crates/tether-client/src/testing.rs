//! In-memory connector and metrics recorder for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::Mutex;
use tether_core::TransportError;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::connection::{Connector, FrameSink, FrameStream, Transport};

enum Inbound {
    Text(String),
    Close,
}

struct PeerState {
    sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    inbound: mpsc::UnboundedSender<Inbound>,
}

/// The orchestrator's side of one mock connection.
#[derive(Clone)]
pub(crate) struct MockPeer {
    state: Arc<PeerState>,
}

impl MockPeer {
    /// Frames the agent has sent so far.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.state.sent.lock().clone()
    }

    /// Wait until at least `n` frames were sent.
    pub(crate) async fn wait_for_sent(&self, n: usize) -> Vec<String> {
        loop {
            let sent = self.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Make every later send fail.
    pub(crate) fn fail_sends(&self) {
        self.state.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Deliver a text frame to the agent.
    pub(crate) fn push_inbound(&self, text: &str) {
        let _ = self.state.inbound.send(Inbound::Text(text.to_string()));
    }

    /// Close the connection from the orchestrator side.
    pub(crate) fn close(&self) {
        let _ = self.state.inbound.send(Inbound::Close);
    }
}

struct MockSink {
    state: Arc<PeerState>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("mock send failure".into()));
        }
        self.state.sent.lock().push(text);
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_text(&mut self) -> Result<String, TransportError> {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Ok(text),
            Some(Inbound::Close) | None => Err(TransportError::Closed),
        }
    }
}

/// Connector whose first `n` attempts fail, recording every attempt time.
pub(crate) struct MockConnector {
    fail_remaining: AtomicU32,
    attempts: Mutex<Vec<Instant>>,
    peers: Mutex<Vec<MockPeer>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::failing_first(0)
    }

    pub(crate) fn failing_first(n: u32) -> Self {
        Self {
            fail_remaining: AtomicU32::new(n),
            attempts: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `n` attempts.
    pub(crate) fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    /// Peer of the `i`-th successful connection.
    pub(crate) fn peer(&self, i: usize) -> MockPeer {
        self.peers.lock()[i].clone()
    }

    /// Wait for the `i`-th successful connection.
    pub(crate) async fn wait_for_peer(&self, i: usize) -> MockPeer {
        loop {
            if let Some(peer) = self.peers.lock().get(i).cloned() {
                return peer;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        self.attempts.lock().push(Instant::now());
        let fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TransportError::Connect {
                url: self.endpoint(),
                message: "connection refused".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(PeerState {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            inbound: tx,
        });
        self.peers.lock().push(MockPeer {
            state: Arc::clone(&state),
        });
        Ok(Transport {
            sink: Box::new(MockSink { state }),
            stream: Box::new(MockStream { inbound: rx }),
        })
    }

    fn endpoint(&self) -> String {
        "mock://orchestrator".into()
    }
}

/// Recorder that remembers the name of every counter touched.
#[derive(Default)]
pub(crate) struct CounterNames {
    names: Mutex<Vec<String>>,
}

impl CounterNames {
    pub(crate) fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

impl Recorder for CounterNames {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.names.lock().push(key.name().to_string());
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
