//! Settings loading with layered sources and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AmbientSettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//!    (objects merge per key, arrays and scalars are replaced)
//! 3. Apply `AMBIENT_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Json, Serialized};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::AmbientSettings;

/// Resolve the default settings file path (`~/.ambient/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ambient").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AmbientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AmbientSettings> {
    let mut settings = load_layers(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_layers(path: &Path) -> Result<AmbientSettings> {
    let mut figment = Figment::from(Serialized::defaults(AmbientSettings::default()));
    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }
    Ok(figment.extract()?)
}

/// Apply environment overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning and the file/default value is kept.
pub fn apply_env_overrides<F>(settings: &mut AmbientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("AMBIENT_PORT", 1, 65_535) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.string("AMBIENT_BACKEND_API_URL") {
        settings.server.backend_api_url = v;
    }
    if let Some(v) = env.string("AMBIENT_CORS_ORIGINS") {
        settings.server.cors_origins = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    // ── Controller ──────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_WATCH_NAMESPACE") {
        settings.controller.namespace = Some(v);
    }
    if let Some(v) = env.string("AMBIENT_RUNNER_IMAGE") {
        settings.controller.runner_image = v;
    }
    if let Some(v) = env.u64_in("AMBIENT_POLL_INTERVAL_MS", 100, 600_000) {
        settings.controller.poll_interval_ms = v;
    }
    if let Some(v) = env.u64_in("AMBIENT_RETRY_LIMIT", 1, 100) {
        settings.controller.retry_limit = u32::try_from(v).unwrap_or(settings.controller.retry_limit);
    }
    if let Some(v) = env.u64_in("AMBIENT_ACTIVE_DEADLINE_SECS", 60, 7 * 24 * 3600) {
        settings.controller.active_deadline_secs = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_DEFAULT_MODEL") {
        settings.session.default_llm.model = v;
    }
    if let Some(v) = env.u64_in("AMBIENT_CLONE_MAX_ATTEMPTS", 1, 100) {
        settings.session.clone_max_attempts =
            u32::try_from(v).unwrap_or(settings.session.clone_max_attempts);
    }

    // ── Content ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_CONTENT_URL_TEMPLATE") {
        settings.content.url_template = v;
    }
    if let Some(v) = env.string("AMBIENT_CONTENT_ROOT") {
        settings.content.root = v;
    }

    // ── Cluster ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_CLUSTER_API_URL") {
        settings.cluster.api_url = v;
    }
    if let Some(v) = env.string("AMBIENT_SERVICE_TOKEN_PATH") {
        settings.cluster.service_token_path = v;
    }
    if let Some(v) = env.bool("AMBIENT_INSECURE_SKIP_TLS_VERIFY") {
        settings.cluster.insecure_skip_tls_verify = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AMBIENT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("AMBIENT_LOG_JSON") {
        settings.logging.json = v;
    }
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
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::errors::SettingsError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_layers(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.clone_max_attempts, 5);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9090}}, "controller": {{"retryLimit": 7, "namespace": "team-a"}}}}"#
        )
        .unwrap();
        let settings = load_layers(file.path()).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.controller.retry_limit, 7);
        assert_eq!(settings.controller.namespace.as_deref(), Some("team-a"));
        assert_eq!(settings.controller.poll_interval_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_layers(file.path()), Err(SettingsError::Load(_))));
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"session": {{"cloneMaxAttempts": 0}}}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(file.path()),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = AmbientSettings::default();
        apply_env_overrides(
            &mut settings,
            lookup(&[
                ("AMBIENT_PORT", "9000"),
                ("AMBIENT_WATCH_NAMESPACE", "team-b"),
                ("AMBIENT_LOG_JSON", "yes"),
                ("AMBIENT_CORS_ORIGINS", "https://a.example, https://b.example"),
            ]),
        );
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.controller.namespace.as_deref(), Some("team-b"));
        assert!(settings.logging.json);
        assert_eq!(settings.server.cors_origins.len(), 2);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = AmbientSettings::default();
        apply_env_overrides(
            &mut settings,
            lookup(&[
                ("AMBIENT_PORT", "0"),
                ("AMBIENT_RETRY_LIMIT", "many"),
                ("AMBIENT_LOG_JSON", "perhaps"),
            ]),
        );
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.controller.retry_limit, 3);
        assert!(!settings.logging.json);
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
    }
}
