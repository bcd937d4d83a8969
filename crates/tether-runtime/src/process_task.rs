//! Process-backed prompt task.
//!
//! Runs `bash -c <command>` once per prompt. The prompt text is written to
//! the child's stdin and also exported as `TETHER_PROMPT`; each non-empty
//! stdout line becomes one outbound `message`. A stop kills the child.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::Envelope;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::task::{PromptContext, PromptTask};

/// Characters of stderr kept for a failure report.
const STDERR_TAIL_CHARS: usize = 500;

/// Prompt task backed by a shell command.
#[derive(Clone, Debug)]
pub struct ProcessTask {
    command: String,
}

impl ProcessTask {
    /// Task running `command` under `bash -c`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl PromptTask for ProcessTask {
    async fn run(&self, ctx: PromptContext) -> Result<(), TaskError> {
        let recent = Value::Array(ctx.recent_messages.clone()).to_string();

        let mut cmd = tokio::process::Command::new("bash");
        let _ = cmd
            .arg("-c")
            .arg(&self.command)
            .env("TETHER_AGENT_ID", ctx.agent_id.as_str())
            .env("TETHER_PROMPT", &ctx.text)
            .env(
                "TETHER_SYSTEM_PROMPT",
                ctx.additional_system_prompt.as_deref().unwrap_or_default(),
            )
            .env("TETHER_UPLOAD_DIR", &ctx.upload_dir)
            .env("TETHER_RECENT_MESSAGES", recent)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %self.command, "spawning task process");
        let mut child = cmd.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let text = ctx.text.clone();
            let _ = tokio::spawn(async move {
                // The command may never read stdin; a broken pipe is fine.
                let _ = stdin.write_all(text.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TaskError::Failed("task stdout unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !ctx.probe.is_running() {
                        break;
                    }
                    if line.trim().is_empty() {
                        continue;
                    }
                    ctx.sink.push(Envelope::message(line).with("show_ui", true));
                }
                () = ctx.probe.cancelled() => break,
            }
        }

        if !ctx.probe.is_running() {
            info!("task stopped, killing process");
            let _ = child.kill().await;
            return Ok(());
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!("task process exited cleanly");
            return Ok(());
        }

        let code = status
            .code()
            .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
        warn!(%code, "task process failed");
        let tail = tail(stderr.trim(), STDERR_TAIL_CHARS);
        Err(TaskError::Failed(if tail.is_empty() {
            format!("task command exited with {code}")
        } else {
            format!("task command exited with {code}: {tail}")
        }))
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
