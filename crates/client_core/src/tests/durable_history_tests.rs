use super::*;

#[tokio::test]
async fn persisted_entries_reload_across_log_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!(
        "sqlite://{}",
        dir.path()
            .join("history.db")
            .to_string_lossy()
            .replace('\\', "/")
    );

    let first = DurableHistoryLog::initialize(&database_url)
        .await
        .expect("first log");
    first
        .append(&HistoryEntry::create("Open blinds", 3))
        .await
        .expect("append create");
    first
        .append(&HistoryEntry::decrypt("Open blinds", 3))
        .await
        .expect("append decrypt");
    drop(first);

    let second = DurableHistoryLog::initialize(&database_url)
        .await
        .expect("second log");
    let all = second.load_all().await.expect("load");
    assert_eq!(all.len(), 2);
    assert!(matches!(all[0], HistoryEntry::Create { .. }));
    assert!(matches!(all[1], HistoryEntry::Decrypt { value: 3, .. }));

    let recent = second.recent(1).await.expect("recent");
    assert_eq!(recent, vec![all[1].clone()]);
}
