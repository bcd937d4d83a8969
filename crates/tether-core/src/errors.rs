//! Error taxonomy for the uplink.
//!
//! - [`TransportError`]: the socket failed. Never fatal; the caller drops the
//!   connection handle and reconnects.
//! - [`ProtocolError`]: a frame could not be understood. Logged and dropped;
//!   the connection stays up.
//!
//! Task failures live in `tether-runtime`, next to the dispatcher that
//! catches them.

use thiserror::Error;

/// Failure of the physical connection to the orchestrator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the socket failed.
    #[error("connect to {url} failed: {message}")]
    Connect {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The peer closed the connection (close frame or end of stream).
    #[error("connection closed by peer")]
    Closed,

    /// The handle was already replaced by a newer connection.
    #[error("connection handle is stale")]
    Stale,
}

impl TransportError {
    /// Short label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Send(_) => "send",
            Self::Receive(_) => "receive",
            Self::Closed => "closed",
            Self::Stale => "stale",
        }
    }
}

/// A frame that could not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame was JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A required field was absent or had the wrong type.
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),

    /// A fragment's indices were out of range.
    #[error("invalid fragment for {message_id}: {reason}")]
    InvalidFragment {
        /// Fragment group.
        message_id: String,
        /// What was wrong.
        reason: String,
    },

    /// A fragment disagreed with earlier fragments about the group size.
    #[error("fragment for {message_id} reports {got} chunks, expected {expected}")]
    FragmentMismatch {
        /// Fragment group.
        message_id: String,
        /// `total_chunks` seen first.
        expected: u32,
        /// `total_chunks` on the offending fragment.
        got: u32,
    },
}
