//! # tether-core
//!
//! Foundation types, errors, and utilities for the Tether agent uplink.
//!
//! This crate provides the shared vocabulary that all other Tether crates depend on:
//!
//! - **Identities**: [`ids::AgentId`], [`ids::MessageId`] as newtypes
//! - **Envelopes**: [`envelope::Envelope`] keyed by [`envelope::MessageType`], plus
//!   the typed [`envelope::PromptRequest`] view of an inbound prompt
//! - **Frames**: [`frame::InboundFrame`] and [`frame::Fragment`] for chunked inbound traffic
//! - **Execution status**: [`status::ExecutionState`] as reported to the orchestrator
//! - **Errors**: [`errors::TransportError`] and [`errors::ProtocolError`] via `thiserror`
//! - **Retry**: [`retry::BackoffConfig`] and [`retry::Backoff`] for reconnect delays
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other tether crates.

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod retry;
pub mod status;

pub use envelope::{Envelope, MessageType, PromptRequest, UploadedFile};
pub use errors::{ProtocolError, TransportError};
pub use frame::{Fragment, InboundFrame};
pub use ids::{AgentId, MessageId};
pub use status::ExecutionState;
