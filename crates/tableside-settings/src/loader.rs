//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TablesideSettings::default()`]
//! 2. If `~/.tableside/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TablesideSettings;

/// Resolve the path to the settings file (`~/.tableside/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tableside").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TablesideSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a merged result that
/// fails [`TablesideSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TablesideSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<TablesideSettings> {
    let defaults = serde_json::to_value(TablesideSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (falling back to file/default).
pub fn apply_env_overrides(settings: &mut TablesideSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut TablesideSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TABLESIDE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TABLESIDE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("TABLESIDE_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.usize("TABLESIDE_QUEUE_CAPACITY", 1, 65_536) {
        settings.hub.outbound_queue_capacity = v;
    }

    // ── Keepalive ───────────────────────────────────────────────────
    if let Some(v) = env.u64("TABLESIDE_PING_INTERVAL_MS", 100, 600_000) {
        settings.keepalive.ping_interval_ms = v;
    }
    if let Some(v) = env.u64("TABLESIDE_READ_TIMEOUT_MS", 100, 600_000) {
        settings.keepalive.read_timeout_ms = v;
    }
    if let Some(v) = env.u64("TABLESIDE_WRITE_TIMEOUT_MS", 100, 600_000) {
        settings.keepalive.write_timeout_ms = v;
    }

    // ── Orders ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TABLESIDE_ORDER_SERVICE_URL") {
        settings.orders.service_url = v;
    }
    if let Some(v) = env.u64("TABLESIDE_ORDER_TIMEOUT_MS", 100, 300_000) {
        settings.orders.timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TABLESIDE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn overrides(pairs: &[(&str, &str)]) -> TablesideSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = TablesideSettings::default();
        apply_overrides(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8888, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
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
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_layered(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, TablesideSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"hub": {"outboundQueueCapacity": 32}, "orders": {"timeoutMs": 2500}}"#,
        )
        .unwrap();

        let settings = read_layered(&path).unwrap();
        assert_eq!(settings.hub.outbound_queue_capacity, 32);
        assert_eq!(settings.hub.delivery_queue_capacity, 100);
        assert_eq!(settings.orders.timeout_ms, 2500);
        assert_eq!(settings.orders.create_path, "/api/order");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_inverted_keepalive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"keepalive": {"pingIntervalMs": 90000, "readTimeoutMs": 60000}}"#,
        )
        .unwrap();

        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let settings = overrides(&[
            ("TABLESIDE_PORT", "9100"),
            ("TABLESIDE_QUEUE_CAPACITY", "64"),
            ("TABLESIDE_ORDER_SERVICE_URL", "http://orders:9000"),
            ("TABLESIDE_LOG_LEVEL", "debug"),
        ]);
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.hub.outbound_queue_capacity, 64);
        assert_eq!(settings.orders.service_url, "http://orders:9000");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn env_out_of_range_is_ignored() {
        let settings = overrides(&[
            ("TABLESIDE_QUEUE_CAPACITY", "0"),
            ("TABLESIDE_READ_TIMEOUT_MS", "soon"),
        ]);
        assert_eq!(settings.hub.outbound_queue_capacity, 256);
        assert_eq!(settings.keepalive.read_timeout_ms, 60_000);
    }

    #[test]
    fn env_empty_string_is_ignored() {
        let settings = overrides(&[("TABLESIDE_HOST", "")]);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parse helpers ───────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("54000", 100, 600_000), Some(54_000));
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("256", 1, 65_536), Some(256));
        assert_eq!(parse_usize_range("abc", 1, 10), None);
    }
}
