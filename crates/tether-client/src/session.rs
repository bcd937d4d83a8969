//! Session orchestration.
//!
//! [`SessionOrchestrator`] is the composition root. It owns the outbound
//! queue, the execution state machine and the connection manager, and runs
//! up to three loops against them:
//!
//! - **inbound**: receive, reassemble, dispatch; reconnect on failure
//! - **outbound**: every drain tick, send from the head of the queue until
//!   it is empty or a send fails
//! - **heartbeat**: optional, only pushes into the queue
//!
//! Every loop selects on the shutdown token and exits promptly when it fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_runtime::{
    DispatchOutcome, ExecutionStateMachine, FileIngestor, OutboundQueue, OutboundSink,
    PromptDispatcher, PromptTask,
};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, Connector};
use crate::heartbeat::run_heartbeat;
use crate::reassembly::ChunkReassembler;

/// Wires the session components together and runs the session loops.
pub struct SessionOrchestrator {
    config: SessionConfig,
    queue: Arc<OutboundQueue>,
    machine: ExecutionStateMachine,
    manager: Arc<ConnectionManager>,
    dispatcher: Arc<PromptDispatcher>,
}

impl SessionOrchestrator {
    /// Build a session. Nothing runs until [`Self::spawn`] or [`Self::run`].
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        task: Arc<dyn PromptTask>,
        ingestor: Arc<dyn FileIngestor>,
    ) -> Self {
        let queue = Arc::new(OutboundQueue::with_limit(config.max_pending_outbound));
        let machine = ExecutionStateMachine::new();
        let manager = Arc::new(ConnectionManager::new(
            connector,
            config.backoff,
            config.agent_id.clone(),
            Arc::clone(&queue),
            machine.clone(),
        ));
        let dispatcher = Arc::new(PromptDispatcher::new(
            config.agent_id.clone(),
            machine.clone(),
            OutboundSink::new(Arc::clone(&queue)),
            task,
            ingestor,
            config.upload_dir.clone(),
        ));
        Self {
            config,
            queue,
            machine,
            manager,
            dispatcher,
        }
    }

    /// The outbound queue.
    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// The execution state machine.
    pub fn machine(&self) -> &ExecutionStateMachine {
        &self.machine
    }

    /// The connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Spawn the session loops. They stop when `cancel` fires.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            agent_id = %self.config.agent_id,
            heartbeat = self.config.heartbeat_interval.is_some(),
            "starting session loops"
        );

        let mut handles = vec![
            tokio::spawn(inbound_loop(
                Arc::clone(&self.manager),
                Arc::clone(&self.dispatcher),
                self.config.reassembly_ttl,
                cancel.clone(),
            )),
            tokio::spawn(outbound_loop(
                Arc::clone(&self.manager),
                Arc::clone(&self.queue),
                self.config.drain_interval,
                cancel.clone(),
            )),
        ];
        if let Some(interval) = self.config.heartbeat_interval {
            handles.push(tokio::spawn(run_heartbeat(
                OutboundSink::new(Arc::clone(&self.queue)),
                interval,
                cancel.clone(),
            )));
        }
        handles
    }

    /// Run the session loops until `cancel` fires and all of them have exited.
    pub async fn run(&self, cancel: CancellationToken) {
        let handles = self.spawn(&cancel);
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                warn!(error = %err, "session loop ended abnormally");
            }
        }
        info!("session loops stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loops
// ─────────────────────────────────────────────────────────────────────────────

#[instrument(skip_all)]
async fn inbound_loop(
    manager: Arc<ConnectionManager>,
    dispatcher: Arc<PromptDispatcher>,
    reassembly_ttl: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut reassembler = ChunkReassembler::new(reassembly_ttl);
    let mut handle = tokio::select! {
        handle = manager.connect() => handle,
        () = cancel.cancelled() => return,
    };

    loop {
        let received = tokio::select! {
            received = manager.receive(&handle) => received,
            () = cancel.cancelled() => break,
        };

        match received {
            Ok(Some(frame)) => {
                if let Some(envelope) = reassembler.push(frame) {
                    let kind = envelope.kind().to_string();
                    match dispatcher.handle(envelope).await {
                        DispatchOutcome::Admitted(_) => debug!(%kind, "prompt started"),
                        DispatchOutcome::Rejected(err) => {
                            debug!(%kind, error = %err, "envelope rejected");
                        }
                        outcome => debug!(%kind, ?outcome, "envelope dispatched"),
                    }
                }
                let _ = reassembler.evict_expired(Instant::now());
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    connection = handle.id(),
                    error = %err,
                    category = err.category(),
                    "receive failed, reconnecting"
                );
                handle = tokio::select! {
                    handle = manager.reconnect(Some(handle.id())) => handle,
                    () = cancel.cancelled() => break,
                };
            }
        }
    }
    debug!("inbound loop stopped");
}

#[instrument(skip_all)]
async fn outbound_loop(
    manager: Arc<ConnectionManager>,
    queue: Arc<OutboundQueue>,
    drain_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => break,
        }
        tokio::select! {
            () = drain(&manager, &queue) => {}
            () = cancel.cancelled() => break,
        }
    }
    debug!("outbound loop stopped");
}

/// Send from the head of the queue until it is empty, no handle exists, or
/// a send fails. A failed entry stays at the head for the next tick.
async fn drain(manager: &ConnectionManager, queue: &OutboundQueue) {
    loop {
        // Handle before head: a fresh handle's init is already queued.
        let Some(handle) = manager.current() else {
            return;
        };
        let Some(pending) = queue.peek_pending() else {
            return;
        };

        match manager.send(&handle, &pending.envelope).await {
            Ok(()) => {
                let _ = queue.acknowledge(pending.seq);
            }
            Err(err) => {
                warn!(
                    connection = handle.id(),
                    error = %err,
                    pending = queue.len(),
                    "send failed, reconnecting"
                );
                let _ = manager.reconnect(Some(handle.id())).await;
                return;
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
    use crate::testing::{MockConnector, MockPeer};
    use async_trait::async_trait;
    use std::future::Future;
    use std::path::PathBuf;
    use tether_core::retry::BackoffConfig;
    use tether_core::{AgentId, Envelope, MessageType};
    use tether_runtime::{DiskFileIngestor, PromptContext, TaskError};

    /// Echoes the prompt text as one message.
    struct Echo;

    #[async_trait]
    impl PromptTask for Echo {
        async fn run(&self, ctx: PromptContext) -> Result<(), TaskError> {
            ctx.sink.push(Envelope::message(format!("echo: {}", ctx.text)));
            Ok(())
        }
    }

    /// Runs until stopped.
    struct UntilStopped;

    #[async_trait]
    impl PromptTask for UntilStopped {
        async fn run(&self, ctx: PromptContext) -> Result<(), TaskError> {
            ctx.probe.cancelled().await;
            Ok(())
        }
    }

    fn config(heartbeat: Option<Duration>) -> SessionConfig {
        SessionConfig {
            agent_id: AgentId::from("pam-1"),
            backoff: BackoffConfig {
                base_delay_ms: 10,
                max_delay_ms: 50,
            },
            drain_interval: Duration::from_millis(5),
            heartbeat_interval: heartbeat,
            reassembly_ttl: Some(Duration::from_secs(60)),
            max_pending_outbound: None,
            upload_dir: PathBuf::from("/nonexistent/uploads"),
        }
    }

    fn session(
        connector: &Arc<MockConnector>,
        task: Arc<dyn PromptTask>,
        heartbeat: Option<Duration>,
    ) -> SessionOrchestrator {
        SessionOrchestrator::new(
            config(heartbeat),
            Arc::clone(connector) as Arc<dyn Connector>,
            task,
            Arc::new(DiskFileIngestor),
        )
    }

    async fn within<T>(fut: impl Future<Output = T>) -> T {
        time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("timed out")
    }

    fn decode(frames: &[String]) -> Vec<Envelope> {
        frames.iter().map(|f| Envelope::parse(f).unwrap()).collect()
    }

    fn push_fragments(peer: &MockPeer, id: &str, json: &str, n: usize) {
        let chars: Vec<char> = json.chars().collect();
        let size = chars.len().div_ceil(n);
        let pieces: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
        let total = pieces.len();
        // Deliver in reverse to exercise ordering.
        for (i, data) in pieces.iter().enumerate().rev() {
            let frame = serde_json::json!({
                "message_id": id,
                "chunk": i,
                "total_chunks": total,
                "data": data,
            });
            peer.push_inbound(&frame.to_string());
        }
    }

    #[tokio::test]
    async fn fragmented_prompt_runs_and_reports() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector, Arc::new(Echo), None);
        let cancel = CancellationToken::new();
        let handles = session.spawn(&cancel);

        let peer = within(connector.wait_for_peer(0)).await;
        let sent = decode(&within(peer.wait_for_sent(1)).await);
        assert_eq!(sent[0].kind(), &MessageType::Init);
        assert_eq!(sent[0].str_field("agent_id"), Some("pam-1"));

        push_fragments(
            &peer,
            "m1",
            r#"{"message-type":"prompt","text":"hello there"}"#,
            4,
        );

        let sent = decode(&within(peer.wait_for_sent(3)).await);
        assert_eq!(sent[1].text(), Some("echo: hello there"));
        assert!(sent[2].flag("end_message"));
        assert_eq!(sent[2].str_field("prompt_running"), Some("stopped"));
        assert!(!session.machine().is_running());

        cancel.cancel();
        for handle in handles {
            within(handle).await.unwrap();
        }
    }

    #[tokio::test]
    async fn failed_send_is_retried_first_on_new_connection() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector, Arc::new(Echo), None);
        let cancel = CancellationToken::new();
        let _handles = session.spawn(&cancel);

        let first = within(connector.wait_for_peer(0)).await;
        let _ = within(first.wait_for_sent(1)).await;
        first.fail_sends();

        session.queue().push_back(Envelope::message("X"));
        session.queue().push_back(Envelope::message("Y"));

        let second = within(connector.wait_for_peer(1)).await;
        let sent = decode(&within(second.wait_for_sent(3)).await);
        assert_eq!(sent[0].kind(), &MessageType::Init);
        assert_eq!(sent[1].text(), Some("X"));
        assert_eq!(sent[2].text(), Some("Y"));
        assert_eq!(first.sent().len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn peer_close_reconnects_with_new_init() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector, Arc::new(Echo), None);
        let cancel = CancellationToken::new();
        let _handles = session.spawn(&cancel);

        let first = within(connector.wait_for_peer(0)).await;
        let _ = within(first.wait_for_sent(1)).await;
        connector.fail_next(2);
        first.close();

        let second = within(connector.wait_for_peer(1)).await;
        let sent = decode(&within(second.wait_for_sent(1)).await);
        assert_eq!(sent[0].kind(), &MessageType::Init);
        assert_eq!(connector.attempt_times().len(), 4);
        assert_eq!(session.manager().current().unwrap().id(), 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn second_prompt_ignored_until_stop() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector, Arc::new(UntilStopped), None);
        let cancel = CancellationToken::new();
        let _handles = session.spawn(&cancel);

        let peer = within(connector.wait_for_peer(0)).await;
        let _ = within(peer.wait_for_sent(1)).await;

        peer.push_inbound(r#"{"message-type":"prompt","text":"one"}"#);
        within(async {
            while !session.machine().is_running() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        peer.push_inbound(r#"{"message-type":"prompt","text":"two"}"#);
        peer.push_inbound(r#"{"message-type":"stop"}"#);

        let sent = decode(&within(peer.wait_for_sent(2)).await);
        assert!(sent[1].flag("end_message"));
        assert!(!session.machine().is_running());

        time::sleep(Duration::from_millis(50)).await;
        let ends = decode(&peer.sent())
            .iter()
            .filter(|e| e.flag("end_message"))
            .count();
        assert_eq!(ends, 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn heartbeats_reach_the_wire() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector, Arc::new(Echo), Some(Duration::from_millis(20)));
        let cancel = CancellationToken::new();
        let handles = session.spawn(&cancel);
        assert_eq!(handles.len(), 3);

        let peer = within(connector.wait_for_peer(0)).await;
        let sent = decode(&within(peer.wait_for_sent(3)).await);
        assert!(
            sent[1..]
                .iter()
                .all(|e| e.text() == Some("Heartbeat ping") && !e.flag("show_ui"))
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn run_returns_after_cancel() {
        let connector = Arc::new(MockConnector::failing_first(u32::MAX));
        let session = session(&connector, Arc::new(Echo), Some(Duration::from_secs(60)));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        let _ = tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        within(session.run(cancel)).await;
        assert!(session.manager().current().is_none());
    }
}
