//! Package-level constants.

/// Current version of the Tether agent (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "tether";

/// Upstream host used when `HOST_IP` is not set.
pub const DEFAULT_UPSTREAM_HOST: &str = "localhost";

/// Orchestrator WebSocket port.
pub const DEFAULT_UPSTREAM_PORT: u16 = 3030;

/// Orchestrator WebSocket path.
pub const DEFAULT_UPSTREAM_PATH: &str = "/ws";

/// Identity used when the agent runs outside a container.
pub const DEFAULT_LOCAL_AGENT_ID: &str = "pam-1";

/// Maximum fragment payload size the orchestrator emits, in bytes.
pub const ORCHESTRATOR_CHUNK_SIZE: usize = 1024;

/// Received frames are truncated to this many characters in debug logs.
pub const FRAME_LOG_PREVIEW_CHARS: usize = 250;
