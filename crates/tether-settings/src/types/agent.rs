//! Agent identity, uploads and the task command.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tether_core::AgentId;
use tether_core::constants::DEFAULT_LOCAL_AGENT_ID;

/// Identity settings. See [`crate::loader::resolve_identity`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Explicit identity; wins over `CONTAINER_ID` when not running locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Identity used when running locally.
    pub local_id: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            id: None,
            local_id: DEFAULT_LOCAL_AGENT_ID.to_string(),
        }
    }
}

/// Where prompt attachments are written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    /// Root directory; each agent writes under `<rootDir>/<agent id>/`.
    pub root_dir: PathBuf,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/tmp/tether/uploads"),
        }
    }
}

impl UploadSettings {
    /// Upload directory for one agent.
    pub fn agent_dir(&self, agent_id: &AgentId) -> PathBuf {
        self.root_dir.join(agent_id.as_str())
    }
}

/// Command run for each admitted prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSettings {
    /// Passed to `bash -c`; the prompt arrives on stdin.
    pub command: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            command: "cat".to_string(),
        }
    }
}
