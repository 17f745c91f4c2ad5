use shared::domain::HistoryEntry;
use storage::Storage;

#[tokio::test]
async fn history_survives_reopening_the_database_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("history.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let created = HistoryEntry::create("Thermostat", 21);
    let decrypted = HistoryEntry::decrypt("Thermostat", 21);
    {
        let storage = Storage::new(&database_url).await.expect("open");
        storage.append_history(&created).await.expect("append create");
        storage
            .append_history(&decrypted)
            .await
            .expect("append decrypt");
        storage.pool().close().await;
    }

    assert!(db_path.exists(), "database file should exist");

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let entries: Vec<_> = reopened
        .load_history()
        .await
        .expect("load")
        .into_iter()
        .map(|stored| stored.entry)
        .collect();
    assert_eq!(entries, vec![created, decrypted]);
}
