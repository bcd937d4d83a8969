//! Prompt execution status as reported on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a prompt is currently executing.
///
/// Serialized lowercase (`"running"` / `"stopped"`) in the `prompt_running`
/// field of outbound envelopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// No prompt is executing.
    #[default]
    Stopped,
    /// A prompt task has been admitted and not yet stopped.
    Running,
}

impl ExecutionState {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }

    /// Shorthand for `self == ExecutionState::Running`.
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
