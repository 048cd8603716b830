//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{InvalidTokenPolicy, LabSettings, LogFormat};

/// Directory holding the settings file and the default presence database.
pub fn settings_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".langlab")
}

/// Path of the user settings file (`~/.langlab/settings.json`).
pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LabSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<LabSettings> {
    let defaults = serde_json::to_value(LabSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LabSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut LabSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value
/// is kept. `LANGLAB_*` names win over the bare `PORT` / `JWT_SECRET`.
pub fn apply_overrides_from(settings: &mut LabSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("LANGLAB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_u16(&read, "PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_u16(&read, "LANGLAB_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_u64(&read, "LANGLAB_LIVENESS_INTERVAL_MS", 100, 3_600_000) {
        settings.liveness.interval_ms = v;
    }
    if let Some(v) = read("JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read("LANGLAB_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read("LANGLAB_INVALID_TOKEN_POLICY") {
        match v.to_lowercase().as_str() {
            "ignore" => settings.auth.on_invalid_token = InvalidTokenPolicy::Ignore,
            "close" => settings.auth.on_invalid_token = InvalidTokenPolicy::Close,
            _ => tracing::warn!(key = "LANGLAB_INVALID_TOKEN_POLICY", value = %v, "invalid policy env var, ignoring"),
        }
    }
    if let Some(v) = read("LANGLAB_DB_PATH") {
        settings.presence.db_path = v;
    }
    if let Some(v) = read("LANGLAB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("LANGLAB_LOG_FORMAT") {
        match v.to_lowercase().as_str() {
            "compact" => settings.logging.format = LogFormat::Compact,
            "json" => settings.logging.format = LogFormat::Json,
            _ => tracing::warn!(key = "LANGLAB_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
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

fn read_u16(read: &impl Fn(&str) -> Option<String>, name: &str, min: u16, max: u16) -> Option<u16> {
    let val = read(name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_u64(read: &impl Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = read(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 4000, "host": "0.0.0.0"}});
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
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.liveness.interval_ms, 30_000);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"liveness": {"intervalMs": 5000}, "auth": {"onInvalidToken": "close"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.liveness.interval_ms, 5000);
        assert_eq!(settings.auth.on_invalid_token, InvalidTokenPolicy::Close);
        assert_eq!(settings.server.send_queue_capacity, 256);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"liveness": {"intervalMs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn port_env_overrides() {
        let mut s = LabSettings::default();
        apply_overrides_from(&mut s, env(&[("PORT", "5000")]));
        assert_eq!(s.server.port, 5000);
    }

    #[test]
    fn prefixed_names_win() {
        let mut s = LabSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("PORT", "5000"),
                ("LANGLAB_PORT", "6000"),
                ("JWT_SECRET", "a"),
                ("LANGLAB_JWT_SECRET", "b"),
            ]),
        );
        assert_eq!(s.server.port, 6000);
        assert_eq!(s.auth.jwt_secret, "b");
    }

    #[test]
    fn invalid_values_are_ignored() {
        let mut s = LabSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("LANGLAB_PORT", "99999"),
                ("LANGLAB_LIVENESS_INTERVAL_MS", "5"),
                ("LANGLAB_LOG_FORMAT", "xml"),
                ("LANGLAB_INVALID_TOKEN_POLICY", "explode"),
            ]),
        );
        assert_eq!(s.server.port, 4000);
        assert_eq!(s.liveness.interval_ms, 30_000);
        assert_eq!(s.logging.format, LogFormat::Compact);
        assert_eq!(s.auth.on_invalid_token, InvalidTokenPolicy::Ignore);
    }

    #[test]
    fn string_and_enum_overrides() {
        let mut s = LabSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("LANGLAB_HOST", "127.0.0.1"),
                ("LANGLAB_DB_PATH", "/tmp/p.db"),
                ("LANGLAB_LOG_LEVEL", "debug"),
                ("LANGLAB_LOG_FORMAT", "JSON"),
                ("LANGLAB_INVALID_TOKEN_POLICY", "close"),
                ("LANGLAB_LIVENESS_INTERVAL_MS", "1000"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.presence.db_path, "/tmp/p.db");
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.format, LogFormat::Json);
        assert_eq!(s.auth.on_invalid_token, InvalidTokenPolicy::Close);
        assert_eq!(s.liveness.interval_ms, 1000);
    }

    #[test]
    fn empty_values_are_skipped() {
        let mut s = LabSettings::default();
        apply_overrides_from(&mut s, env(&[("LANGLAB_HOST", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
        assert_eq!(parse_u64_range("30000", 100, 3_600_000), Some(30_000));
        assert_eq!(parse_u64_range("50", 100, 3_600_000), None);
    }
}
