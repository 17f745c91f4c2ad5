use anyhow::Result;
use async_trait::async_trait;
use shared::domain::HistoryEntry;

/// In-memory, append-only log of the actions this session performed.
#[derive(Debug, Clone, Default)]
pub struct HistoryShadow {
    entries: Vec<HistoryEntry>,
}

impl HistoryShadow {
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Places previously persisted entries ahead of anything appended so far.
    pub(crate) fn seed(&mut self, mut persisted: Vec<HistoryEntry>) {
        persisted.append(&mut self.entries);
        self.entries = persisted;
    }

    /// Up to `limit` newest entries, oldest first.
    pub fn recent(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Durable mirror of the history shadow.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> Result<()>;
    async fn load_all(&self) -> Result<Vec<HistoryEntry>>;
}

pub struct EphemeralHistoryLog;

#[async_trait]
impl HistoryLog for EphemeralHistoryLog {
    async fn append(&self, _entry: &HistoryEntry) -> Result<()> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }
}
