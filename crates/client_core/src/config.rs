use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "voice_client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub success_clear_after_ms: u64,
    pub error_clear_after_ms: u64,
    pub history_display_limit: usize,
    pub record_label: String,
    pub secondary_code: u64,
    pub history_database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            success_clear_after_ms: 2_000,
            error_clear_after_ms: 3_000,
            history_display_limit: 10,
            record_label: "Voice Command Data".into(),
            secondary_code: 0,
            history_database_url: "sqlite://./data/history.db".into(),
        }
    }
}

impl Settings {
    pub fn success_clear_after(&self) -> Duration {
        Duration::from_millis(self.success_clear_after_ms)
    }

    pub fn error_clear_after(&self) -> Duration {
        Duration::from_millis(self.error_clear_after_ms)
    }
}

/// Defaults, then `voice_client.toml` in the working directory, then `APP__*`
/// environment variables.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match toml::from_str::<Settings>(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "config: ignoring malformed settings file: {err}"
                );
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__SUCCESS_CLEAR_AFTER_MS").and_then(|v| v.parse().ok()) {
        settings.success_clear_after_ms = v;
    }
    if let Some(v) = lookup("APP__ERROR_CLEAR_AFTER_MS").and_then(|v| v.parse().ok()) {
        settings.error_clear_after_ms = v;
    }
    if let Some(v) = lookup("APP__HISTORY_DISPLAY_LIMIT").and_then(|v| v.parse().ok()) {
        settings.history_display_limit = v;
    }
    if let Some(v) = lookup("APP__RECORD_LABEL") {
        settings.record_label = v;
    }
    if let Some(v) = lookup("APP__SECONDARY_CODE").and_then(|v| v.parse().ok()) {
        settings.secondary_code = v;
    }
    if let Some(v) = lookup("APP__HISTORY_DATABASE_URL") {
        settings.history_database_url = v;
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    if raw_database_url.trim().is_empty() {
        return Settings::default().history_database_url;
    }
    storage::normalize_database_url(raw_database_url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
