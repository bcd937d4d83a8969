//! # tether-agent
//!
//! Agent uplink binary. Loads settings, resolves the agent identity, wires
//! the session components together and runs until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_client::{SessionConfig, SessionOrchestrator, ShutdownCoordinator, WsConnector};
use tether_core::AgentId;
use tether_runtime::{DiskFileIngestor, ProcessTask};
use tether_settings::TetherSettings;

/// Time the session loops get to exit after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tether agent uplink.
#[derive(Parser, Debug)]
#[command(name = "tether-agent", about = "Connects a sandboxed agent to its orchestrator")]
struct Cli {
    /// Settings file (default `~/.tether/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Orchestrator host (overrides `HOST_IP` and settings).
    #[arg(long)]
    host: Option<String>,

    /// Orchestrator port.
    #[arg(long)]
    port: Option<u16>,

    /// Agent identity (skips identity resolution).
    #[arg(long)]
    agent_id: Option<String>,

    /// Enable the heartbeat loop.
    #[arg(long)]
    heartbeat: bool,

    /// Log level filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply flags on top of loaded settings.
    fn apply(&self, settings: &mut TetherSettings) {
        if let Some(host) = &self.host {
            settings.upstream.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.upstream.port = port;
        }
        if self.heartbeat {
            settings.session.heartbeat_enabled = true;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.validate();
    }

    fn identity(&self, settings: &TetherSettings) -> AgentId {
        match &self.agent_id {
            Some(id) if !id.trim().is_empty() => AgentId::from(id.trim()),
            _ => tether_settings::resolve_identity_from_env(settings),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(tether_settings::settings_path);
    let mut settings = tether_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    tether_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let agent_id = args.identity(&settings);
    let url = settings.upstream.url();
    tracing::info!(
        %agent_id,
        %url,
        heartbeat = settings.session.heartbeat_enabled,
        task = %settings.task.command,
        "starting tether agent"
    );

    let session = SessionOrchestrator::new(
        SessionConfig::from_settings(&settings, agent_id),
        Arc::new(WsConnector::new(url)),
        Arc::new(ProcessTask::new(settings.task.command.clone())),
        Arc::new(DiskFileIngestor),
    );

    let shutdown = ShutdownCoordinator::new(SHUTDOWN_TIMEOUT);
    let handles = session.spawn(&shutdown.token());

    wait_for_signal().await?;

    tracing::info!("Shutting down...");
    let _ = session.machine().request_stop();
    let aborted = shutdown.graceful_shutdown(handles).await;
    tracing::info!(aborted, pending = session.queue().len(), "Shutdown complete");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}
