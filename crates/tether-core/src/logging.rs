//! Logging bootstrap.
//!
//! Call [`init_subscriber`] once at startup. Everything else in the
//! workspace logs through `tracing` macros with structured fields.

use crate::constants::FRAME_LOG_PREVIEW_CHARS;

/// Initialize the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, events are
/// emitted as JSON lines instead of the compact human format.
pub fn init_subscriber(level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.compact().try_init();
    }
}

/// Truncate a frame for debug logging, respecting char boundaries.
pub fn preview(text: &str) -> &str {
    match text.char_indices().nth(FRAME_LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
