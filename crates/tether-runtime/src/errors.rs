//! Runtime error types.
//!
//! Neither enum ever reaches the process boundary: task errors are turned
//! into an error `message` envelope by the dispatcher, and ingest errors
//! are logged per file.

use std::path::PathBuf;

/// Failure of one prompt execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task reported a failure.
    #[error("{0}")]
    Failed(String),

    /// I/O while driving the task.
    #[error("task I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Error category string for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::Io(_) => "io",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// Failure to persist one uploaded file.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The entry lacked `name` or `data`.
    #[error("upload entry missing `{0}`")]
    MissingField(&'static str),

    /// `data` was not valid base64.
    #[error("invalid base64 in {name}: {message}")]
    InvalidBase64 {
        /// File name as sent.
        name: String,
        /// Decoder message.
        message: String,
    },

    /// The name had no usable final component.
    #[error("invalid upload file name {0:?}")]
    InvalidName(String),

    /// Creating the directory or writing the file failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
