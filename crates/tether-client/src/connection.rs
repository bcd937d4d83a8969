//! Connection management.
//!
//! At most one live [`ConnectionHandle`] exists at a time. It sits in a slot
//! that is replaced wholesale on reconnect; loops clone the `Arc` at the
//! start of a step and either use a valid handle or learn it went stale.
//!
//! Connecting never gives up: failures back off exponentially up to the
//! configured cap. Every successful connect pushes an `init` envelope to the
//! front of the outbound queue before the handle is published.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use tether_core::logging::preview;
use tether_core::retry::{Backoff, BackoffConfig};
use tether_core::{AgentId, Envelope, InboundFrame, TransportError};
use tether_runtime::{ExecutionStateMachine, OutboundQueue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Transport seam
// ─────────────────────────────────────────────────────────────────────────────

/// Write half of a text-frame socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// Read half of a text-frame socket.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame. Control frames are handled internally.
    async fn next_text(&mut self) -> Result<String, TransportError>;
}

/// An opened socket, split into halves.
pub struct Transport {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub stream: Box<dyn FrameStream>,
}

/// Opens sockets to the orchestrator.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Make one connection attempt.
    async fn connect(&self) -> Result<Transport, TransportError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// One live connection. Never mutated after creation except to be closed.
pub struct ConnectionHandle {
    id: u64,
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    stream: tokio::sync::Mutex<Box<dyn FrameStream>>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    fn new(id: u64, transport: Transport) -> Self {
        Self {
            id,
            sink: tokio::sync::Mutex::new(transport.sink),
            stream: tokio::sync::Mutex::new(transport.stream),
            closed: CancellationToken::new(),
        }
    }

    /// Monotonic connection number, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this handle has been invalidated.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the connection slot and the reconnect policy.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    slot: RwLock<Option<Arc<ConnectionHandle>>>,
    connect_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    backoff: BackoffConfig,
    agent_id: AgentId,
    queue: Arc<OutboundQueue>,
    machine: ExecutionStateMachine,
}

impl ConnectionManager {
    /// Create a manager. Nothing is dialled until [`Self::connect`].
    pub fn new(
        connector: Arc<dyn Connector>,
        backoff: BackoffConfig,
        agent_id: AgentId,
        queue: Arc<OutboundQueue>,
        machine: ExecutionStateMachine,
    ) -> Self {
        Self {
            connector,
            slot: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
            backoff,
            agent_id,
            queue,
            machine,
        }
    }

    /// The live handle, if any.
    pub fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.slot.read().clone()
    }

    /// Return the live handle, dialling until one exists.
    pub async fn connect(&self) -> Arc<ConnectionHandle> {
        self.reconnect(None).await
    }

    /// Replace the handle numbered `stale_id`.
    ///
    /// Serialized: when another caller already replaced it, the newer
    /// handle is returned without dialling again.
    pub async fn reconnect(&self, stale_id: Option<u64>) -> Arc<ConnectionHandle> {
        let _guard = self.connect_lock.lock().await;
        if let Some(current) = self.current() {
            if Some(current.id) != stale_id {
                return current;
            }
            self.invalidate(&current);
        }
        self.dial().await
    }

    /// Send one envelope. Failure invalidates the handle; the caller keeps
    /// the envelope for retry.
    pub async fn send(
        &self,
        handle: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        if handle.is_closed() {
            return Err(TransportError::Stale);
        }
        let text = envelope.to_json();
        let result = handle.sink.lock().await.send_text(text).await;
        match result {
            Ok(()) => {
                counter!("tether_envelopes_sent_total").increment(1);
                debug!(connection = handle.id, kind = %envelope.kind(), "sent envelope");
                Ok(())
            }
            Err(err) => {
                counter!("tether_send_failures_total", "category" => err.category()).increment(1);
                self.invalidate(handle);
                Err(err)
            }
        }
    }

    /// Receive the next frame.
    ///
    /// `Ok(None)` is a frame that could not be decoded; it has been logged
    /// and dropped. Transport failure invalidates the handle.
    pub async fn receive(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<Option<InboundFrame>, TransportError> {
        let mut stream = handle.stream.lock().await;
        let received = tokio::select! {
            result = stream.next_text() => result,
            () = handle.closed.cancelled() => Err(TransportError::Stale),
        };
        drop(stream);

        let text = match received {
            Ok(text) => text,
            Err(err) => {
                self.invalidate(handle);
                return Err(err);
            }
        };

        debug!(connection = handle.id, frame = preview(&text), "received frame");
        match InboundFrame::parse(&text) {
            Ok(frame) => Ok(Some(frame)),
            Err(err) => {
                warn!(connection = handle.id, error = %err, "dropping undecodable frame");
                counter!("tether_frames_dropped_total").increment(1);
                Ok(None)
            }
        }
    }

    /// Close `handle` and empty the slot if it still holds it.
    pub fn invalidate(&self, handle: &ConnectionHandle) {
        handle.closed.cancel();
        let mut slot = self.slot.write();
        if slot.as_ref().is_some_and(|h| h.id == handle.id) {
            *slot = None;
            debug!(connection = handle.id, "connection handle discarded");
        }
    }

    async fn dial(&self) -> Arc<ConnectionHandle> {
        let endpoint = self.connector.endpoint();
        let mut backoff = Backoff::new(self.backoff);
        loop {
            counter!("tether_reconnect_attempts_total").increment(1);
            match self.connector.connect().await {
                Ok(transport) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let handle = Arc::new(ConnectionHandle::new(id, transport));
                    let state = self.machine.state();
                    self.queue.push_front(Envelope::init(&self.agent_id, state));
                    *self.slot.write() = Some(Arc::clone(&handle));
                    counter!("tether_connections_established_total").increment(1);
                    info!(
                        connection = id,
                        %endpoint,
                        agent_id = %self.agent_id,
                        prompt_running = state.as_str(),
                        attempts = backoff.attempt() + 1,
                        "connected to orchestrator"
                    );
                    return handle;
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(
                        %endpoint,
                        error = %err,
                        attempt = backoff.attempt(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CounterNames, MockConnector};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tether_core::{ExecutionState, MessageType};
    use tokio::time::Instant;

    fn manager(connector: Arc<MockConnector>) -> (Arc<ConnectionManager>, Arc<OutboundQueue>) {
        let queue = Arc::new(OutboundQueue::new());
        let manager = Arc::new(ConnectionManager::new(
            connector,
            BackoffConfig {
                base_delay_ms: 1000,
                max_delay_ms: 60_000,
            },
            AgentId::from("pam-1"),
            Arc::clone(&queue),
            ExecutionStateMachine::new(),
        ));
        (manager, queue)
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_then_init_at_front() {
        let connector = Arc::new(MockConnector::failing_first(2));
        let (manager, queue) = manager(Arc::clone(&connector));
        queue.push_back(Envelope::message("queued during outage"));

        let start = Instant::now();
        let handle = manager.connect().await;
        assert_eq!(handle.id(), 1);

        let attempts = connector.attempt_times();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(1));
        assert_eq!(attempts[2] - attempts[1], Duration::from_secs(2));
        assert_eq!(attempts[0], start);

        let head = queue.pop_front().unwrap();
        assert_eq!(head.kind(), &MessageType::Init);
        assert_eq!(head.str_field("prompt_running"), Some(ExecutionState::Stopped.as_str()));
        assert_eq!(queue.pop_front().unwrap().text(), Some("queued during outage"));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_caps_at_max() {
        let connector = Arc::new(MockConnector::failing_first(9));
        let (manager, _queue) = manager(Arc::clone(&connector));
        let _ = manager.connect().await;

        let attempts = connector.attempt_times();
        let gaps: Vec<u64> = attempts
            .windows(2)
            .map(|w| u64::try_from((w[1] - w[0]).as_secs()).unwrap())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[tokio::test]
    async fn connect_reuses_live_handle() {
        let connector = Arc::new(MockConnector::new());
        let (manager, queue) = manager(Arc::clone(&connector));
        let a = manager.connect().await;
        let b = manager.connect().await;
        assert_eq!(a.id(), b.id());
        assert_eq!(connector.attempt_times().len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reconnects_dial_once() {
        let connector = Arc::new(MockConnector::new());
        let (manager, queue) = manager(Arc::clone(&connector));
        let first = manager.connect().await;
        let _ = queue.pop_front();

        let (a, b) = tokio::join!(
            manager.reconnect(Some(first.id())),
            manager.reconnect(Some(first.id()))
        );
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), 2);
        assert!(first.is_closed());
        assert_eq!(connector.attempt_times().len(), 2);
        assert_eq!(queue.len(), 1, "one init per outage");
    }

    #[tokio::test]
    async fn send_failure_invalidates_handle() {
        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;
        let peer = connector.peer(0);

        peer.fail_sends();
        let err = manager
            .send(&handle, &Envelope::message("x"))
            .await
            .unwrap_err();
        assert_matches!(err, TransportError::Send(_));
        assert!(handle.is_closed());
        assert!(manager.current().is_none());

        assert_matches!(
            manager.send(&handle, &Envelope::message("y")).await,
            Err(TransportError::Stale)
        );
    }

    #[tokio::test]
    async fn send_writes_json() {
        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;
        manager
            .send(&handle, &Envelope::message("hello"))
            .await
            .unwrap();
        let sent = connector.peer(0).sent();
        assert_eq!(sent.len(), 1);
        let env = Envelope::parse(&sent[0]).unwrap();
        assert_eq!(env.text(), Some("hello"));
    }

    #[tokio::test]
    async fn receive_decodes_and_drops_garbage() {
        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;
        let peer = connector.peer(0);

        peer.push_inbound("not json");
        peer.push_inbound(r#"{"message-type":"stop"}"#);
        assert_matches!(manager.receive(&handle).await, Ok(None));
        assert_matches!(
            manager.receive(&handle).await,
            Ok(Some(InboundFrame::Envelope(e))) => assert_eq!(e.kind(), &MessageType::Stop)
        );
    }

    #[tokio::test]
    async fn undecodable_frame_counted_apart_from_fragments() {
        let recorder = CounterNames::default();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;
        connector.peer(0).push_inbound("{broken");
        assert_matches!(manager.receive(&handle).await, Ok(None));

        let names = recorder.names();
        assert!(names.iter().any(|n| n == "tether_frames_dropped_total"));
        assert!(!names.iter().any(|n| n == "tether_fragments_dropped_total"));
    }

    #[tokio::test]
    async fn receive_on_closed_peer_invalidates() {
        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;
        connector.peer(0).close();
        assert_matches!(manager.receive(&handle).await, Err(TransportError::Closed));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn blocked_receive_wakes_when_handle_replaced() {
        let connector = Arc::new(MockConnector::new());
        let (manager, _queue) = manager(Arc::clone(&connector));
        let handle = manager.connect().await;

        let m = Arc::clone(&manager);
        let h = Arc::clone(&handle);
        let reader = tokio::spawn(async move { m.receive(&h).await });
        tokio::task::yield_now().await;

        let _ = manager.reconnect(Some(handle.id())).await;
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(result, Err(TransportError::Stale));
    }
}
