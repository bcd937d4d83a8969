//! Chunk reassembly.
//!
//! The orchestrator splits large envelopes into fragments sharing a
//! `message_id`. Fragments are buffered per group until every index in
//! `[0, total_chunks)` has been seen, then concatenated in index order and
//! parsed as one envelope. Duplicate indices overwrite.
//!
//! Groups that never complete are discarded by [`ChunkReassembler::evict_expired`]
//! once older than the configured TTL. Without a TTL they are kept forever.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use metrics::counter;
use tether_core::{Envelope, Fragment, InboundFrame, MessageId, ProtocolError};
use tracing::{debug, warn};

struct Group {
    total_chunks: u32,
    chunks: BTreeMap<u32, String>,
    first_seen: Instant,
}

/// Buffer of partial fragment groups, fed by the inbound loop only.
pub struct ChunkReassembler {
    groups: HashMap<MessageId, Group>,
    ttl: Option<Duration>,
}

impl ChunkReassembler {
    /// Reassembler evicting incomplete groups older than `ttl`.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            groups: HashMap::new(),
            ttl,
        }
    }

    /// Feed one decoded frame. Complete envelopes pass straight through.
    pub fn push(&mut self, frame: InboundFrame) -> Option<Envelope> {
        match frame {
            InboundFrame::Envelope(envelope) => Some(envelope),
            InboundFrame::Fragment(fragment) => self.ingest(fragment),
        }
    }

    /// Feed one fragment; returns the envelope once its group is complete.
    ///
    /// Bad fragments are logged and dropped.
    pub fn ingest(&mut self, fragment: Fragment) -> Option<Envelope> {
        self.ingest_at(fragment, Instant::now())
    }

    /// [`Self::ingest`] with an explicit arrival time.
    pub fn ingest_at(&mut self, fragment: Fragment, now: Instant) -> Option<Envelope> {
        let message_id = fragment.message_id.clone();
        match self.try_ingest_at(fragment, now) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(message_id = %message_id, error = %err, "dropping fragment");
                counter!("tether_fragments_dropped_total").increment(1);
                None
            }
        }
    }

    /// Fallible core of [`Self::ingest_at`].
    pub fn try_ingest_at(
        &mut self,
        fragment: Fragment,
        now: Instant,
    ) -> Result<Option<Envelope>, ProtocolError> {
        let Fragment {
            message_id,
            chunk,
            total_chunks,
            data,
        } = fragment;

        let group = self.groups.entry(message_id.clone()).or_insert_with(|| Group {
            total_chunks,
            chunks: BTreeMap::new(),
            first_seen: now,
        });

        if group.total_chunks != total_chunks {
            return Err(ProtocolError::FragmentMismatch {
                message_id: message_id.into_inner(),
                expected: group.total_chunks,
                got: total_chunks,
            });
        }

        let _ = group.chunks.insert(chunk, data);
        debug!(
            message_id = %message_id,
            chunk,
            total_chunks,
            received = group.chunks.len(),
            "buffered fragment"
        );

        if group.chunks.len() < total_chunks as usize {
            return Ok(None);
        }

        let Some(group) = self.groups.remove(&message_id) else {
            return Ok(None);
        };
        let joined: String = group.chunks.into_values().collect();
        Envelope::parse(&joined).map(Some)
    }

    /// Drop groups whose first fragment arrived more than the TTL before `now`.
    /// Returns how many were dropped.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.groups.len();
        self.groups.retain(|message_id, group| {
            let keep = now.saturating_duration_since(group.first_seen) <= ttl;
            if !keep {
                warn!(
                    message_id = %message_id,
                    received = group.chunks.len(),
                    total_chunks = group.total_chunks,
                    "evicting incomplete fragment group"
                );
            }
            keep
        });
        let evicted = before - self.groups.len();
        if evicted > 0 {
            counter!("tether_reassembly_evicted_total")
                .increment(u64::try_from(evicted).unwrap_or(u64::MAX));
        }
        evicted
    }

    /// Number of incomplete groups.
    pub fn pending(&self) -> usize {
        self.groups.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
