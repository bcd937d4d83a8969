//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it changes.

mod agent;
mod session;
mod upstream;

pub use agent::*;
pub use session::*;
pub use upstream::*;

use serde::{Deserialize, Serialize};
use tether_core::retry::BackoffConfig;
use tracing::warn;

/// Smallest accepted heartbeat interval.
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 100;
/// Smallest accepted drain interval.
pub const MIN_DRAIN_INTERVAL_MS: u64 = 10;

/// Root settings type for the Tether agent.
///
/// ```json
/// {
///   "upstream": { "host": "10.0.0.2", "port": 3030 },
///   "session": { "heartbeatEnabled": true },
///   "reconnect": { "maxDelayMs": 12000 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Settings schema version.
    pub version: String,
    /// Orchestrator endpoint.
    pub upstream: UpstreamSettings,
    /// Identity.
    pub agent: AgentSettings,
    /// Loop timing and queue policy.
    pub session: SessionSettings,
    /// Reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Upload directory.
    pub uploads: UploadSettings,
    /// Per-prompt task command.
    pub task: TaskSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TetherSettings {
    fn default() -> Self {
        Self {
            version: tether_core::constants::VERSION.to_string(),
            upstream: UpstreamSettings::default(),
            agent: AgentSettings::default(),
            session: SessionSettings::default(),
            reconnect: BackoffConfig::default(),
            uploads: UploadSettings::default(),
            task: TaskSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TetherSettings {
    /// Clamp out-of-range values, warning for each adjustment.
    pub fn validate(&mut self) {
        if self.upstream.port == 0 {
            warn!("upstream.port is 0, using default");
            self.upstream.port = tether_core::constants::DEFAULT_UPSTREAM_PORT;
        }
        if self.upstream.scheme != "ws" && self.upstream.scheme != "wss" {
            warn!(scheme = %self.upstream.scheme, "unsupported upstream scheme, using ws");
            self.upstream.scheme = "ws".to_string();
        }
        if self.session.heartbeat_interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
            warn!(
                value = self.session.heartbeat_interval_ms,
                min = MIN_HEARTBEAT_INTERVAL_MS,
                "heartbeatIntervalMs too small, clamping"
            );
            self.session.heartbeat_interval_ms = MIN_HEARTBEAT_INTERVAL_MS;
        }
        if self.session.drain_interval_ms < MIN_DRAIN_INTERVAL_MS {
            warn!(
                value = self.session.drain_interval_ms,
                min = MIN_DRAIN_INTERVAL_MS,
                "drainIntervalMs too small, clamping"
            );
            self.session.drain_interval_ms = MIN_DRAIN_INTERVAL_MS;
        }
        if self.session.max_pending_outbound == Some(0) {
            warn!("maxPendingOutbound is 0, clamping to 1");
            self.session.max_pending_outbound = Some(1);
        }
        if self.reconnect.base_delay_ms == 0 {
            warn!("reconnect.baseDelayMs is 0, clamping to 1");
            self.reconnect.base_delay_ms = 1;
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            warn!(
                base = self.reconnect.base_delay_ms,
                max = self.reconnect.max_delay_ms,
                "reconnect.maxDelayMs below baseDelayMs, raising"
            );
            self.reconnect.max_delay_ms = self.reconnect.base_delay_ms;
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
