//! Execution state machine.
//!
//! ```text
//! stopped ──(prompt, try_admit)──▶ running
//! running ──(stop, request_stop)─▶ stopped
//! running ──(task ends, complete)▶ stopped
//! ```
//!
//! Only one prompt runs at a time. Each admission bumps a run generation;
//! a [`CancelProbe`] reports `running` only while its own generation is
//! current, and [`ExecutionStateMachine::complete`] only resets the state
//! for the current generation. A task that ignores a `stop` and outlives
//! the next admission therefore cannot observe or clobber the newer run.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::ExecutionState;
use tokio_util::sync::CancellationToken;

struct Inner {
    state: ExecutionState,
    generation: u64,
    cancel: CancellationToken,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: ExecutionState::Stopped,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }
}

/// Owner of the single-flight execution state.
#[derive(Clone, Default)]
pub struct ExecutionStateMachine {
    inner: Arc<Mutex<Inner>>,
}

/// Proof of admission for one run, consumed by [`ExecutionStateMachine::complete`].
#[derive(Clone)]
pub struct RunTicket {
    generation: u64,
    probe: CancelProbe,
}

impl RunTicket {
    /// Run generation this ticket was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancellation probe for the task.
    pub fn probe(&self) -> CancelProbe {
        self.probe.clone()
    }
}

impl ExecutionStateMachine {
    /// New machine in `stopped`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        self.inner.lock().state
    }

    /// Whether a prompt is running.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// `stopped → running`. Returns `None` when a run is already active.
    pub fn try_admit(&self) -> Option<RunTicket> {
        let mut inner = self.inner.lock();
        if inner.state.is_running() {
            return None;
        }
        inner.generation += 1;
        inner.state = ExecutionState::Running;
        inner.cancel = CancellationToken::new();
        let generation = inner.generation;
        let probe = CancelProbe {
            inner: Arc::clone(&self.inner),
            generation,
            token: inner.cancel.clone(),
        };
        Some(RunTicket { generation, probe })
    }

    /// `running → stopped` on a stop command. Returns `false` when nothing was running.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.is_running() {
            return false;
        }
        inner.state = ExecutionState::Stopped;
        inner.cancel.cancel();
        true
    }

    /// `running → stopped` when the ticket's task ends. Returns `false` when
    /// the ticket is stale or the run was already stopped.
    pub fn complete(&self, ticket: &RunTicket) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != ticket.generation {
            return false;
        }
        inner.cancel.cancel();
        let was_running = inner.state.is_running();
        inner.state = ExecutionState::Stopped;
        was_running
    }
}

/// Read-only view of the state handed to a running task.
#[derive(Clone)]
pub struct CancelProbe {
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    token: CancellationToken,
}

impl CancelProbe {
    /// State as seen by this run: `stopped` once stopped or superseded.
    pub fn state(&self) -> ExecutionState {
        let inner = self.inner.lock();
        if inner.generation == self.generation {
            inner.state
        } else {
            ExecutionState::Stopped
        }
    }

    /// Whether the task should keep going.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Resolves once this run is stopped or completed.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
