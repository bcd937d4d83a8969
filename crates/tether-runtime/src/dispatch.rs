//! Prompt dispatch.
//!
//! Turns inbound `prompt` and `stop` envelopes into state machine
//! transitions. An admitted prompt runs on its own spawned task; whatever
//! happens to it, exactly one terminal envelope follows, preceded by one
//! error envelope when the task failed or panicked.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tether_core::{AgentId, Envelope, ExecutionState, MessageType, PromptRequest, ProtocolError};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::errors::TaskError;
use crate::execution::{ExecutionStateMachine, RunTicket};
use crate::outbound::OutboundSink;
use crate::task::{PromptContext, PromptTask};
use crate::uploads::{FileIngestor, IngestOutcome};

/// What the dispatcher did with an envelope.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A prompt was admitted; the handle resolves after the terminal envelope is queued.
    Admitted(JoinHandle<()>),
    /// A prompt arrived while another was running.
    Ignored,
    /// A prompt was malformed.
    Rejected(ProtocolError),
    /// A stop arrived; `true` when it stopped a running prompt.
    Stopped(bool),
    /// Not a kind the dispatcher acts on.
    Unhandled,
}

/// Routes control envelopes to the execution state machine.
pub struct PromptDispatcher {
    agent_id: AgentId,
    machine: ExecutionStateMachine,
    sink: OutboundSink,
    task: Arc<dyn PromptTask>,
    ingestor: Arc<dyn FileIngestor>,
    upload_dir: PathBuf,
}

impl PromptDispatcher {
    /// Create a dispatcher for one agent.
    pub fn new(
        agent_id: AgentId,
        machine: ExecutionStateMachine,
        sink: OutboundSink,
        task: Arc<dyn PromptTask>,
        ingestor: Arc<dyn FileIngestor>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            agent_id,
            machine,
            sink,
            task,
            ingestor,
            upload_dir,
        }
    }

    /// The state machine this dispatcher drives.
    pub fn machine(&self) -> &ExecutionStateMachine {
        &self.machine
    }

    /// Act on one complete inbound envelope.
    pub async fn handle(&self, envelope: Envelope) -> DispatchOutcome {
        match envelope.kind() {
            MessageType::Prompt => self.handle_prompt(&envelope).await,
            MessageType::Stop => {
                let stopped = self.machine.request_stop();
                info!(stopped, "stop requested");
                DispatchOutcome::Stopped(stopped)
            }
            other => {
                debug!(kind = %other, "ignoring envelope");
                DispatchOutcome::Unhandled
            }
        }
    }

    async fn handle_prompt(&self, envelope: &Envelope) -> DispatchOutcome {
        if self.machine.is_running() {
            info!("prompt ignored, another prompt is running");
            counter!("tether_prompts_ignored_total").increment(1);
            return DispatchOutcome::Ignored;
        }

        let request = match PromptRequest::from_envelope(envelope) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "dropping malformed prompt");
                return DispatchOutcome::Rejected(err);
            }
        };

        if !request.files.is_empty() {
            let outcomes = self.ingestor.ingest(&self.upload_dir, &request.files).await;
            let saved = outcomes.iter().filter(|o| o.is_saved()).count();
            let failed: Vec<String> = outcomes
                .iter()
                .filter_map(|o| match o {
                    IngestOutcome::Failed(err) => Some(err.to_string()),
                    IngestOutcome::Saved(_) => None,
                })
                .collect();
            info!(saved, failed = failed.len(), "ingested prompt files");
            for err in failed {
                warn!(error = %err, "upload failed");
            }
        }

        let Some(ticket) = self.machine.try_admit() else {
            counter!("tether_prompts_ignored_total").increment(1);
            return DispatchOutcome::Ignored;
        };
        counter!("tether_prompts_admitted_total").increment(1);
        info!(generation = ticket.generation(), "prompt admitted");

        let ctx = PromptContext {
            agent_id: self.agent_id.clone(),
            sink: self.sink.clone(),
            probe: ticket.probe(),
            text: request.text,
            recent_messages: request.recent_messages,
            additional_system_prompt: request.additional_system_prompt,
            upload_dir: self.upload_dir.clone(),
        };
        let handle = tokio::spawn(run_prompt(
            self.agent_id.clone(),
            self.machine.clone(),
            self.sink.clone(),
            Arc::clone(&self.task),
            ticket,
            ctx,
        ));
        DispatchOutcome::Admitted(handle)
    }
}

#[instrument(skip_all, fields(agent_id = %agent_id, generation = ticket.generation()))]
async fn run_prompt(
    agent_id: AgentId,
    machine: ExecutionStateMachine,
    sink: OutboundSink,
    task: Arc<dyn PromptTask>,
    ticket: RunTicket,
    ctx: PromptContext,
) {
    let inner = tokio::spawn(async move { task.run(ctx).await });
    let result = match inner.await {
        Ok(result) => result,
        Err(join_err) => Err(join_error_to_task_error(join_err)),
    };

    if let Err(err) = &result {
        warn!(error = %err, category = err.category(), "prompt task failed");
        counter!("tether_task_failures_total", "category" => err.category()).increment(1);
        sink.push(Envelope::error_message(err.to_string(), ExecutionState::Running));
    }

    let reset = machine.complete(&ticket);
    debug!(reset, "prompt finished");
    sink.push(Envelope::end_message(&agent_id, machine.state()));
}

fn join_error_to_task_error(err: JoinError) -> TaskError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TaskError::Panicked(message)
    } else {
        TaskError::Failed(format!("task aborted: {err}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
