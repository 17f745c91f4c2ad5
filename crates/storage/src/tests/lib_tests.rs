use super::*;

#[tokio::test]
async fn appends_and_loads_history_in_insertion_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = HistoryEntry::create("Lights on", 1);
    let second = HistoryEntry::decrypt("Lights on", 1);

    let seq_a = storage.append_history(&first).await.expect("append first");
    let seq_b = storage.append_history(&second).await.expect("append second");
    assert!(seq_b > seq_a);

    let loaded = storage.load_history().await.expect("load");
    let entries: Vec<_> = loaded.into_iter().map(|stored| stored.entry).collect();
    assert_eq!(entries, vec![first, second]);
}

#[tokio::test]
async fn recent_history_returns_tail_oldest_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    for value in 0..15u64 {
        storage
            .append_history(&HistoryEntry::create(format!("cmd-{value}"), value))
            .await
            .expect("append");
    }

    let recent = storage.recent_history(10).await.expect("recent");
    let values: Vec<u64> = recent.iter().map(|stored| stored.entry.value()).collect();
    assert_eq!(values, (5..15).collect::<Vec<_>>());
    assert_eq!(storage.history_len().await.expect("len"), 15);
}

#[tokio::test]
async fn rejects_values_outside_sqlite_integer_range() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage
        .append_history(&HistoryEntry::create("huge", u64::MAX))
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("exceeds sqlite range"));
    assert_eq!(storage.history_len().await.expect("len"), 0);
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[test]
fn sqlite_path_ignores_memory_and_query_suffix() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/history.db?mode=rwc"),
        Some(PathBuf::from("./data/history.db"))
    );
    assert_eq!(sqlite_path("postgres://localhost/db"), None);
}

#[test]
fn normalizes_paths_and_keeps_full_urls() {
    assert_eq!(
        normalize_database_url("sqlite:data\\history.db"),
        "sqlite://data/history.db"
    );
    assert_eq!(normalize_database_url(" ./h.db "), "sqlite://./h.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite:///var/lib/h.db"),
        "sqlite:///var/lib/h.db"
    );
}
