//! Task collaborator seam.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::AgentId;

use crate::errors::TaskError;
use crate::execution::CancelProbe;
use crate::outbound::OutboundSink;

/// Everything a task receives for one prompt.
#[derive(Clone)]
pub struct PromptContext {
    /// Identity of this agent.
    pub agent_id: AgentId,
    /// Where results go.
    pub sink: OutboundSink,
    /// Consult between steps; exit once it reports `stopped`.
    pub probe: CancelProbe,
    /// Prompt text.
    pub text: String,
    /// Recent conversation history.
    pub recent_messages: Vec<Value>,
    /// Extra system prompt, if configured.
    pub additional_system_prompt: Option<String>,
    /// Directory holding this prompt's attachments.
    pub upload_dir: PathBuf,
}

/// Executes one admitted prompt.
///
/// Implementations push output through [`PromptContext::sink`] and must
/// check [`PromptContext::probe`] often enough to stop promptly.
#[async_trait]
pub trait PromptTask: Send + Sync + 'static {
    /// Run to completion, cancellation, or failure.
    async fn run(&self, ctx: PromptContext) -> Result<(), TaskError>;
}
