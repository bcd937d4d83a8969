//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides
//! 4. [`TetherSettings::validate`] clamps anything out of range
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tether_core::AgentId;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::TetherSettings;

/// Upstream host; its absence means the agent runs locally.
pub const ENV_HOST_IP: &str = "HOST_IP";
/// Container identity assigned by the sandbox host.
pub const ENV_CONTAINER_ID: &str = "CONTAINER_ID";

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    load_settings_with(path, env_lookup)
}

/// Load settings reading overrides through `lookup` instead of the process
/// environment.
pub fn load_settings_with<F>(path: &Path, lookup: F) -> Result<TetherSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TetherSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate();

    if settings.upstream.host.trim().is_empty() {
        return Err(SettingsError::InvalidValue("upstream.host is empty".into()));
    }
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from an arbitrary variable source.
///
/// - Integers must be valid and within range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning
pub fn apply_overrides<F>(settings: &mut TetherSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // ── Upstream ────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, ENV_HOST_IP) {
        settings.upstream.host = v;
    }
    if let Some(v) = read_u16(&lookup, "TETHER_PORT", 1, 65535) {
        settings.upstream.port = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read_bool(&lookup, "TETHER_HEARTBEAT") {
        settings.session.heartbeat_enabled = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_MAX_BACKOFF_MS", 1, 3_600_000) {
        settings.reconnect.max_delay_ms = v;
    }

    // ── Task and uploads ────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "TETHER_UPLOAD_DIR") {
        settings.uploads.root_dir = PathBuf::from(v);
    }
    if let Some(v) = read_string(&lookup, "TETHER_TASK_COMMAND") {
        settings.task.command = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Decide the identity announced to the orchestrator.
///
/// Running locally (no `HOST_IP`) always uses `agent.localId`. Otherwise
/// the explicit `agent.id` wins, then `CONTAINER_ID`, then `agent.localId`.
pub fn resolve_identity(
    settings: &TetherSettings,
    host_ip: Option<&str>,
    container_id: Option<&str>,
) -> AgentId {
    let local = host_ip.is_none_or(str::is_empty);
    if local {
        return AgentId::from(settings.agent.local_id.as_str());
    }
    settings
        .agent
        .id
        .as_deref()
        .or(container_id)
        .filter(|id| !id.is_empty())
        .map_or_else(
            || AgentId::from(settings.agent.local_id.as_str()),
            AgentId::from,
        )
}

/// [`resolve_identity`] against the process environment.
pub fn resolve_identity_from_env(settings: &TetherSettings) -> AgentId {
    let host_ip = env_lookup(ENV_HOST_IP);
    let container_id = env_lookup(ENV_CONTAINER_ID);
    resolve_identity(settings, host_ip.as_deref(), container_id.as_deref())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn read_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_u16<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: u16,
    max: u16,
) -> Option<u16> {
    let val = lookup(name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_u64<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
