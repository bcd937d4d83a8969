//! # tether-runtime
//!
//! Execution side of the Tether agent uplink.
//!
//! - [`outbound::OutboundQueue`]: FIFO of envelopes awaiting the socket, retried at the head
//! - [`execution::ExecutionStateMachine`]: single-flight `stopped`/`running` state with
//!   cooperative cancellation through [`execution::CancelProbe`]
//! - [`dispatch::PromptDispatcher`]: routes `prompt`/`stop` envelopes and reports task outcomes
//! - [`task::PromptTask`] and [`uploads::FileIngestor`]: collaborator seams, with
//!   [`process_task::ProcessTask`] and [`uploads::DiskFileIngestor`] as default implementations
//!
//! ## Crate Position
//!
//! Depends on: tether-core.
//! Depended on by: tether-client, tether-agent.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod execution;
pub mod outbound;
pub mod process_task;
pub mod task;
pub mod uploads;

pub use dispatch::{DispatchOutcome, PromptDispatcher};
pub use errors::{IngestError, TaskError};
pub use execution::{CancelProbe, ExecutionStateMachine, RunTicket};
pub use outbound::{OutboundQueue, OutboundSink, Pending};
pub use process_task::ProcessTask;
pub use task::{PromptContext, PromptTask};
pub use uploads::{DiskFileIngestor, FileIngestor, IngestOutcome};
