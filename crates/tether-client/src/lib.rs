//! # tether-client
//!
//! The uplink's session with the orchestrator.
//!
//! - [`reassembly::ChunkReassembler`]: turns fragment groups into complete envelopes
//! - [`connection::ConnectionManager`]: single replaceable connection handle,
//!   reconnect with exponential backoff, `init` on every connect
//! - [`ws::WsConnector`]: `tokio-tungstenite` transport
//! - [`session::SessionOrchestrator`]: inbound, outbound and heartbeat loops
//! - [`shutdown::ShutdownCoordinator`]: cancellation and bounded drain on exit
//!
//! ## Crate Position
//!
//! Depends on: tether-core, tether-settings, tether-runtime.
//! Depended on by: tether-agent.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod heartbeat;
pub mod reassembly;
pub mod session;
pub mod shutdown;
pub mod ws;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use connection::{
    ConnectionHandle, ConnectionManager, Connector, FrameSink, FrameStream, Transport,
};
pub use heartbeat::run_heartbeat;
pub use reassembly::ChunkReassembler;
pub use session::SessionOrchestrator;
pub use shutdown::ShutdownCoordinator;
pub use ws::WsConnector;
