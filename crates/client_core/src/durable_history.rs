use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::HistoryEntry;
use storage::Storage;

use crate::history::HistoryLog;

pub struct DurableHistoryLog {
    store: Storage,
}

impl DurableHistoryLog {
    pub async fn initialize(database_url: &str) -> Result<Arc<Self>> {
        let store = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to initialize history storage at '{database_url}'"))?;
        Ok(Arc::new(Self { store }))
    }

    pub fn from_storage(store: Storage) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .store
            .recent_history(limit)
            .await?
            .into_iter()
            .map(|stored| stored.entry)
            .collect())
    }
}

#[async_trait]
impl HistoryLog for DurableHistoryLog {
    async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.store
            .append_history(entry)
            .await
            .context("failed to persist history entry")?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .store
            .load_history()
            .await?
            .into_iter()
            .map(|stored| stored.entry)
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/durable_history_tests.rs"]
mod tests;
