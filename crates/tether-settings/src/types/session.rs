//! Session loop timing and queue policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing for the inbound, outbound and heartbeat loops.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Whether the heartbeat loop runs at all.
    pub heartbeat_enabled: bool,
    /// Interval between heartbeat envelopes.
    pub heartbeat_interval_ms: u64,
    /// Idle delay of the outbound drain loop.
    pub drain_interval_ms: u64,
    /// Age after which an incomplete fragment group is discarded. 0 disables eviction.
    pub reassembly_ttl_ms: u64,
    /// Cap on pending outbound envelopes; oldest are dropped beyond it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending_outbound: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_enabled: false,
            heartbeat_interval_ms: 10_000,
            drain_interval_ms: 100,
            reassembly_ttl_ms: 300_000,
            max_pending_outbound: None,
        }
    }
}

impl SessionSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Drain interval as a [`Duration`].
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Reassembly TTL, `None` when eviction is disabled.
    pub fn reassembly_ttl(&self) -> Option<Duration> {
        (self.reassembly_ttl_ms > 0).then(|| Duration::from_millis(self.reassembly_ttl_ms))
    }
}
