//! Outbound delivery queue.
//!
//! An ordered buffer of envelopes waiting for the socket. The drain loop
//! peeks the head, sends it, and only then acknowledges it; a failed send
//! leaves the head in place so it is retried before anything newer. The
//! queue performs no I/O and never blocks producers.
//!
//! Every entry carries a sequence number. Acknowledgement removes the entry
//! with that number rather than blindly popping the head, so an `init`
//! pushed to the front while a send is in flight is not lost.

use std::collections::VecDeque;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tether_core::{Envelope, MessageType};
use tracing::warn;

/// An envelope together with its queue sequence number.
#[derive(Clone, Debug, PartialEq)]
pub struct Pending {
    /// Assigned at enqueue time; unique for the life of the queue.
    pub seq: u64,
    /// The envelope to send.
    pub envelope: Envelope,
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<Pending>,
    next_seq: u64,
}

impl Inner {
    fn assign(&mut self, envelope: Envelope) -> Pending {
        let seq = self.next_seq;
        self.next_seq += 1;
        Pending { seq, envelope }
    }
}

/// FIFO of envelopes awaiting transmission.
#[derive(Default)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    max_pending: Option<usize>,
}

impl OutboundQueue {
    /// Unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that drops its oldest non-`init` entry when `push_back` would
    /// exceed `max_pending`. `None` is unbounded.
    pub fn with_limit(max_pending: Option<usize>) -> Self {
        Self {
            inner: Mutex::default(),
            max_pending,
        }
    }

    /// Append an envelope.
    pub fn push_back(&self, envelope: Envelope) {
        let mut inner = self.inner.lock();
        if let Some(max) = self.max_pending {
            while inner.entries.len() >= max {
                // An `init` announces the connection and is never evicted.
                let Some(idx) = inner
                    .entries
                    .iter()
                    .position(|p| p.envelope.kind() != &MessageType::Init)
                else {
                    break;
                };
                let Some(dropped) = inner.entries.remove(idx) else {
                    break;
                };
                warn!(
                    seq = dropped.seq,
                    kind = %dropped.envelope.kind(),
                    max_pending = max,
                    "outbound queue full, dropping oldest envelope"
                );
                counter!("tether_outbound_dropped_total").increment(1);
            }
        }
        let pending = inner.assign(envelope);
        inner.entries.push_back(pending);
        record_depth(inner.entries.len());
    }

    /// Insert an envelope ahead of everything queued. Never evicts.
    pub fn push_front(&self, envelope: Envelope) {
        let mut inner = self.inner.lock();
        let pending = inner.assign(envelope);
        inner.entries.push_front(pending);
        record_depth(inner.entries.len());
    }

    /// Copy of the head envelope.
    pub fn peek_front(&self) -> Option<Envelope> {
        self.inner.lock().entries.front().map(|p| p.envelope.clone())
    }

    /// Copy of the head entry with its sequence number.
    pub fn peek_pending(&self) -> Option<Pending> {
        self.inner.lock().entries.front().cloned()
    }

    /// Remove and return the head envelope.
    pub fn pop_front(&self) -> Option<Envelope> {
        let mut inner = self.inner.lock();
        let popped = inner.entries.pop_front().map(|p| p.envelope);
        record_depth(inner.entries.len());
        popped
    }

    /// Remove the entry with `seq` after it was sent. Returns `false` when it
    /// is no longer queued (evicted by the bound).
    pub fn acknowledge(&self, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        let removed = match inner.entries.front() {
            Some(head) if head.seq == seq => inner.entries.pop_front().is_some(),
            _ => match inner.entries.iter().position(|p| p.seq == seq) {
                Some(idx) => inner.entries.remove(idx).is_some(),
                None => false,
            },
        };
        record_depth(inner.entries.len());
        removed
    }

    /// Number of pending envelopes.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_depth(depth: usize) {
    gauge!("tether_outbound_queue_depth").set(depth as f64);
}

/// Producer handle handed to tasks and loops.
#[derive(Clone)]
pub struct OutboundSink {
    queue: Arc<OutboundQueue>,
}

impl OutboundSink {
    /// Wrap a shared queue.
    pub fn new(queue: Arc<OutboundQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue an envelope for delivery.
    pub fn push(&self, envelope: Envelope) {
        self.queue.push_back(envelope);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
