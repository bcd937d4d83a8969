//! # tether-settings
//!
//! Configuration for the Tether agent uplink.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **User file**: `~/.tether/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `HOST_IP` and `TETHER_*` overrides (highest priority)
//!
//! The binary applies CLI flags on top of the result. The agent identity
//! is resolved separately by [`resolve_identity`], because it depends on
//! whether the agent runs locally.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings_from_path, load_settings_with, resolve_identity,
    resolve_identity_from_env, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
