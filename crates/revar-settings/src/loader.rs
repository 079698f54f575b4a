//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RevarSettings::default()`]
//! 2. If `~/.revar/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `REVAR_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{RevarSettings, StoreBackend};

/// The revar home directory (`~/.revar`).
pub fn revar_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".revar")
}

/// Resolve the path to the settings file (`~/.revar/settings.json`).
pub fn settings_path() -> PathBuf {
    revar_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RevarSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<RevarSettings> {
    let defaults = serde_json::to_value(RevarSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RevarSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
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

/// Apply `REVAR_*` environment variable overrides.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut RevarSettings) {
    // ── Runtime ─────────────────────────────────────────────────────
    if let Some(v) = read_env_i64("REVAR_DEFAULT_PRIORITY") {
        settings.runtime.default_priority = v;
    }
    if let Some(v) = read_env_bool("REVAR_ALLOW_REASSIGN") {
        settings.runtime.allow_reassign = v;
    }
    if let Some(v) = read_env_u64("REVAR_TRIGGER_INTERVAL_MS", 1, 3_600_000) {
        settings.runtime.trigger_interval_ms = v;
    }
    if let Some(v) = read_env_u64("REVAR_NEXT_TIMEOUT_MS", 1, 86_400_000) {
        settings.runtime.next_timeout_ms = Some(v);
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = read_env_string("REVAR_STORE_BACKEND") {
        match parse_backend(&v) {
            Some(backend) => settings.store.backend = backend,
            None => tracing::warn!(value = %v, "invalid REVAR_STORE_BACKEND, ignoring"),
        }
    }
    if let Some(v) = read_env_string("REVAR_DB_PATH") {
        settings.store.path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("REVAR_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Reject settings the runtime can't operate with.
pub fn validate(settings: &RevarSettings) -> Result<()> {
    if settings.runtime.trigger_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "runtime.triggerIntervalMs must be positive".to_string(),
        ));
    }
    if settings.store.pool_size == 0 {
        return Err(SettingsError::InvalidValue(
            "store.poolSize must be positive".to_string(),
        ));
    }
    Ok(())
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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a store backend name.
pub fn parse_backend(val: &str) -> Option<StoreBackend> {
    match val.to_lowercase().as_str() {
        "memory" | "mem" => Some(StoreBackend::Memory),
        "sqlite" => Some(StoreBackend::Sqlite),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_i64(name: &str) -> Option<i64> {
    let val = std::env::var(name).ok()?;
    let result = val.parse().ok();
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid i64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "runtime": {"defaultPriority": 0, "allowReassign": true}
        });
        let source = serde_json::json!({
            "runtime": {"defaultPriority": 3}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["runtime"]["defaultPriority"], 3);
        assert_eq!(merged["runtime"]["allowReassign"], true);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        assert_eq!(settings.name, "revar");
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"runtime": {"triggerIntervalMs": 25}, "store": {"backend": "memory"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.runtime.trigger_interval_ms, 25);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.store.pool_size, 4);
        assert!(settings.runtime.allow_reassign);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"runtime": {"triggerIntervalMs": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("50", 1, 100), Some(50));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_u64_range("abc", 1, 100), None);
    }

    #[test]
    fn parse_backend_names() {
        assert_eq!(parse_backend("SQLite"), Some(StoreBackend::Sqlite));
        assert_eq!(parse_backend("memory"), Some(StoreBackend::Memory));
        assert_eq!(parse_backend("redis"), None);
    }
}
