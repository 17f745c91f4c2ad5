use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::domain::{CommandId, VoiceCommand};

/// Snapshot of ledger records. Only ever swapped wholesale by a refresh.
#[derive(Debug, Clone)]
pub struct CommandStore {
    commands: Arc<[VoiceCommand]>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Default for CommandStore {
    fn default() -> Self {
        Self {
            commands: Arc::from(Vec::new()),
            refreshed_at: None,
        }
    }
}

impl CommandStore {
    pub fn snapshot(&self) -> Arc<[VoiceCommand]> {
        Arc::clone(&self.commands)
    }

    pub fn replace(&mut self, commands: Vec<VoiceCommand>) {
        self.commands = Arc::from(commands);
        self.refreshed_at = Some(Utc::now());
    }

    pub fn get(&self, id: &CommandId) -> Option<&VoiceCommand> {
        self.commands.iter().find(|command| &command.id == id)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed { loaded: usize, skipped: usize },
    /// Another refresh owns the store; nothing was fetched.
    AlreadyInFlight,
    Disconnected,
}

impl RefreshOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
