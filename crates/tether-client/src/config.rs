//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use tether_core::AgentId;
use tether_core::retry::BackoffConfig;
use tether_settings::TetherSettings;

/// Resolved configuration for one [`crate::SessionOrchestrator`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Identity announced in `init`.
    pub agent_id: AgentId,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Outbound drain interval.
    pub drain_interval: Duration,
    /// Heartbeat interval; `None` disables the heartbeat loop.
    pub heartbeat_interval: Option<Duration>,
    /// Incomplete fragment group lifetime; `None` keeps groups forever.
    pub reassembly_ttl: Option<Duration>,
    /// Outbound queue cap; `None` is unbounded.
    pub max_pending_outbound: Option<usize>,
    /// Per-agent upload directory.
    pub upload_dir: PathBuf,
}

impl SessionConfig {
    /// Build from loaded settings and a resolved identity.
    pub fn from_settings(settings: &TetherSettings, agent_id: AgentId) -> Self {
        let session = &settings.session;
        Self {
            upload_dir: settings.uploads.agent_dir(&agent_id),
            agent_id,
            backoff: settings.reconnect,
            drain_interval: session.drain_interval(),
            heartbeat_interval: session
                .heartbeat_enabled
                .then(|| session.heartbeat_interval()),
            reassembly_ttl: session.reassembly_ttl(),
            max_pending_outbound: session.max_pending_outbound,
        }
    }
}
