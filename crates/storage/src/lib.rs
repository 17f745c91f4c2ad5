use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{HistoryEntry, HistoryKind};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHistoryEntry {
    pub seq: i64,
    pub entry: HistoryEntry,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a separate database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn append_history(&self, entry: &HistoryEntry) -> Result<i64> {
        let value = i64::try_from(entry.value())
            .with_context(|| format!("history value {} exceeds sqlite range", entry.value()))?;
        let rec = sqlx::query(
            "INSERT INTO history_entries (kind, name, value, recorded_at)
             VALUES (?, ?, ?, ?) RETURNING seq",
        )
        .bind(entry.kind().as_str())
        .bind(entry.name())
        .bind(value)
        .bind(entry.timestamp().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.get::<i64, _>(0))
    }

    /// Every persisted entry, oldest first.
    pub async fn load_history(&self) -> Result<Vec<StoredHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT seq, kind, name, value, recorded_at FROM history_entries ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// The `limit` most recent entries, still in insertion order.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<StoredHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT seq, kind, name, value, recorded_at FROM (
                 SELECT seq, kind, name, value, recorded_at
                 FROM history_entries ORDER BY seq DESC LIMIT ?
             ) ORDER BY seq ASC",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    pub async fn history_len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

fn history_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredHistoryEntry> {
    let seq: i64 = row.get("seq");
    let kind_raw: String = row.get("kind");
    let name: String = row.get("name");
    let value: i64 = row.get("value");
    let recorded_at: String = row.get("recorded_at");

    let kind = HistoryKind::parse(&kind_raw)
        .ok_or_else(|| anyhow!("unknown history kind '{kind_raw}' at seq {seq}"))?;
    let value = u64::try_from(value)
        .with_context(|| format!("negative history value {value} at seq {seq}"))?;
    let timestamp = DateTime::parse_from_rfc3339(&recorded_at)
        .with_context(|| format!("invalid history timestamp '{recorded_at}' at seq {seq}"))?
        .with_timezone(&Utc);

    let entry = match kind {
        HistoryKind::Create => HistoryEntry::Create {
            name,
            value,
            timestamp,
        },
        HistoryKind::Decrypt => HistoryEntry::Decrypt {
            name,
            value,
            timestamp,
        },
    };
    Ok(StoredHistoryEntry { seq, entry })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Turns a bare path or `sqlite:` path into a `sqlite://` url. Other urls pass
/// through unchanged.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();
    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    format!("sqlite://{}", path.replace('\\', "/"))
}

pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
