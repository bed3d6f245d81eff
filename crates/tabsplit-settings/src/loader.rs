//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TabsplitSettings::default()`]
//! 2. If `~/.tabsplit/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. [`TabsplitSettings::validate`]

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TabsplitSettings;

/// Resolve the path to the settings file (`~/.tabsplit/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tabsplit").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TabsplitSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TabsplitSettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, reading overrides through `env`.
pub fn load_settings_with_env<F>(path: &Path, env: F) -> Result<TabsplitSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(TabsplitSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TabsplitSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate();
    Ok(settings)
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

/// Apply environment variable overrides read through `env`.
///
/// Invalid values are ignored with a warning (file/default value wins).
pub fn apply_env_overrides<F>(settings: &mut TabsplitSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| env(name).filter(|v| !v.is_empty());

    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = string("OPENAI_API_KEY") {
        settings.api.openai.api_key = Some(v);
    }
    if let Some(v) = string("OPENAI_BASE_URL") {
        settings.api.openai.base_url = v;
    }
    if let Some(v) = string("OPENAI_ORGANIZATION") {
        settings.api.openai.organization = Some(v);
    }

    // ── Models ──────────────────────────────────────────────────────
    if let Some(v) = string("TABSPLIT_EXTRACTION_MODEL") {
        settings.models.extraction_model = v;
    }
    if let Some(v) = string("TABSPLIT_REASONING_MODEL") {
        settings.models.reasoning_model = v;
    }

    // ── Retry ───────────────────────────────────────────────────────
    if let Some(v) = parsed("TABSPLIT_MAX_RETRIES", string("TABSPLIT_MAX_RETRIES"), |s| {
        parse_u64_range(s, 0, 20)
    }) {
        settings.retry.max_retries = v as u32;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("TABSPLIT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed("TABSPLIT_LOG_JSON", string("TABSPLIT_LOG_JSON"), parse_bool) {
        settings.logging.json = v;
    }

    // ── Pipeline ────────────────────────────────────────────────────
    if let Some(v) = parsed(
        "TABSPLIT_ENFORCE_PARTICIPANT_COUNT",
        string("TABSPLIT_ENFORCE_PARTICIPANT_COUNT"),
        parse_bool,
    ) {
        settings.pipeline.enforce_participant_count = v;
    }
    if let Some(v) = parsed("TABSPLIT_MAX_RUNS", string("TABSPLIT_MAX_RUNS"), |s| {
        parse_usize_range(s, 1, 10_000)
    }) {
        settings.pipeline.max_concurrent_runs = v;
    }
}

fn parsed<T>(name: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let result = parse(&raw);
    if result.is_none() {
        tracing::warn!(key = name, value = %raw, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::errors::SettingsError;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"models": {"a": 1, "b": 2}});
        let source = serde_json::json!({"models": {"a": 10}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["models"]["a"], 10);
        assert_eq!(merged["models"]["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_with_env ──────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings =
            load_settings_with_env(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(settings.models.extraction_model, "gpt-4o-mini");
        assert_eq!(settings.retry.max_retries, 3);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"models": {"reasoningModel": "gpt-5"}, "pipeline": {"enforceParticipantCount": true}}"#,
        )
        .unwrap();

        let settings = load_settings_with_env(&path, no_env).unwrap();
        assert_eq!(settings.models.reasoning_model, "gpt-5");
        assert!(settings.pipeline.enforce_participant_count);
        assert_eq!(settings.models.extraction_model, "gpt-4o-mini");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert_matches!(
            load_settings_with_env(&path, no_env),
            Err(SettingsError::Json(_))
        );
    }

    #[test]
    fn load_runs_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"retry": {"jitterFactor": 7.0}}"#).unwrap();

        let settings = load_settings_with_env(&path, no_env).unwrap();
        assert!((settings.retry.jitter_factor - 1.0).abs() < f64::EPSILON);
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"models": {"extractionModel": "from-file"}}"#).unwrap();

        let env = env_from(&[
            ("TABSPLIT_EXTRACTION_MODEL", "from-env"),
            ("OPENAI_API_KEY", "sk-test"),
            ("TABSPLIT_LOG_JSON", "yes"),
        ]);
        let settings = load_settings_with_env(&path, env).unwrap();
        assert_eq!(settings.models.extraction_model, "from-env");
        assert_eq!(settings.api.openai.api_key.as_deref(), Some("sk-test"));
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = TabsplitSettings::default();
        let env = env_from(&[
            ("TABSPLIT_MAX_RETRIES", "lots"),
            ("TABSPLIT_MAX_RUNS", "0"),
            ("TABSPLIT_ENFORCE_PARTICIPANT_COUNT", "maybe"),
        ]);
        apply_env_overrides(&mut settings, env);
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.pipeline.max_concurrent_runs, 64);
        assert!(!settings.pipeline.enforce_participant_count);
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut settings = TabsplitSettings::default();
        apply_env_overrides(&mut settings, env_from(&[("OPENAI_API_KEY", "")]));
        assert!(settings.api.openai.api_key.is_none());
    }

    #[test]
    fn numeric_env_overrides_apply() {
        let mut settings = TabsplitSettings::default();
        let env = env_from(&[("TABSPLIT_MAX_RETRIES", "0"), ("TABSPLIT_MAX_RUNS", "8")]);
        apply_env_overrides(&mut settings, env);
        assert_eq!(settings.retry.max_retries, 0);
        assert_eq!(settings.pipeline.max_concurrent_runs, 8);
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("5", 0, 20), Some(5));
        assert_eq!(parse_u64_range("21", 0, 20), None);
        assert_eq!(parse_usize_range("0", 1, 10), None);
        assert_eq!(parse_usize_range("x", 1, 10), None);
    }
}
