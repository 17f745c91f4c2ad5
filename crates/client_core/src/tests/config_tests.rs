use super::*;

use std::collections::HashMap;

#[test]
fn defaults_match_status_and_history_policy() {
    let settings = Settings::default();
    assert_eq!(settings.success_clear_after(), Duration::from_secs(2));
    assert_eq!(settings.error_clear_after(), Duration::from_secs(3));
    assert_eq!(settings.history_display_limit, 10);
    assert_eq!(settings.record_label, "Voice Command Data");
    assert_eq!(settings.secondary_code, 0);
}

#[test]
fn reads_partial_toml_file_over_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("voice_client.toml");
    fs::write(
        &path,
        "success_clear_after_ms = 500\nrecord_label = \"Lab Commands\"\n",
    )
    .expect("write settings");

    let settings = load_settings_from(&path);
    assert_eq!(settings.success_clear_after_ms, 500);
    assert_eq!(settings.record_label, "Lab Commands");
    assert_eq!(settings.error_clear_after_ms, 3_000);
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("voice_client.toml");
    fs::write(&path, "success_clear_after_ms = \"soon\"").expect("write settings");

    assert_eq!(load_settings_from(&path).success_clear_after_ms, 2_000);
}

#[test]
fn env_overrides_win_and_ignore_unparseable_numbers() {
    let env: HashMap<&str, &str> = [
        ("APP__ERROR_CLEAR_AFTER_MS", "4500"),
        ("APP__HISTORY_DISPLAY_LIMIT", "many"),
        ("APP__HISTORY_DATABASE_URL", "sqlite::memory:"),
    ]
    .into_iter()
    .collect();

    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.error_clear_after_ms, 4_500);
    assert_eq!(settings.history_display_limit, 10);
    assert_eq!(settings.history_database_url, "sqlite::memory:");
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/history.db"),
        "sqlite://./data/history.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\history.db"),
        "sqlite://C:/Users/alice/history.db"
    );
    assert_eq!(normalize_database_url("  "), "sqlite://./data/history.db");
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("data").join("history.db");

    let url = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(url.starts_with("sqlite://"));
    assert!(dir.path().join("data").exists());
}
