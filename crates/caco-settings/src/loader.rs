//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CacoSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. [`CacoSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{
    CacoSettings, DelegationPolicy, MAX_AGE_SECONDS, MAX_CALLS, MAX_DEPTH, MAX_WINDOW_SECONDS,
};

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults. Invalid JSON, or a file whose root is
/// not an object, is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CacoSettings> {
    let defaults = serde_json::to_value(CacoSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        if !user.is_object() {
            return Err(SettingsError::InvalidValue(format!(
                "settings root in {} must be a JSON object",
                path.display()
            )));
        }
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CacoSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
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

/// Apply `CACO_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut CacoSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid or out-of-range values are logged and ignored (falling back to
/// file/default).
pub fn apply_overrides(settings: &mut CacoSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_u64 = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    };
    let read_usize = |name: &str, min: usize, max: usize| {
        let val = lookup(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    };

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("CACO_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Dispatch ────────────────────────────────────────────────────
    if let Some(v) = read_string("CACO_DISPATCH_POLICY") {
        match DelegationPolicy::parse(&v) {
            Some(policy) => settings.dispatch.policy = policy,
            None => {
                tracing::warn!(
                    key = "CACO_DISPATCH_POLICY",
                    value = %v,
                    "unknown policy, ignoring"
                );
            }
        }
    }
    if let Some(v) = read_usize("CACO_MAX_DEPTH", 1, MAX_DEPTH) {
        settings.dispatch.runaway.max_depth = v;
    }
    if let Some(v) = read_u64("CACO_MAX_DURATION_SECONDS", 1, MAX_WINDOW_SECONDS) {
        settings.dispatch.runaway.max_duration_seconds = v;
    }
    if let Some(v) = read_usize("CACO_MAX_CALLS_PER_WINDOW", 1, MAX_CALLS) {
        settings.dispatch.runaway.max_calls_per_window = v;
    }
    if let Some(v) = read_u64("CACO_RATE_WINDOW_SECONDS", 1, MAX_WINDOW_SECONDS) {
        settings.dispatch.runaway.rate_window_seconds = v;
    }
    if let Some(v) = read_u64("CACO_CORRELATION_MAX_AGE_SECONDS", 1, MAX_AGE_SECONDS) {
        settings.dispatch.correlation.max_age_seconds = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
