use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(CommandId);
string_newtype!(ActorAddress);
string_newtype!(ContractAddress);
string_newtype!(CiphertextHandle);

/// A ledger-sourced voice command as seen by the client.
///
/// `decrypted_value` is only authoritative when `is_verified` is set; use
/// [`VoiceCommand::authoritative_value`] instead of reading the field directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCommand {
    pub id: CommandId,
    pub name: String,
    pub ciphertext: CiphertextHandle,
    pub timestamp_secs: i64,
    pub creator: ActorAddress,
    pub public_value1: u64,
    pub public_value2: u64,
    pub is_verified: bool,
    pub decrypted_value: u64,
}

impl VoiceCommand {
    pub fn authoritative_value(&self) -> Option<u64> {
        self.is_verified.then_some(self.decrypted_value)
    }

    pub fn matches_search(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self.creator.as_str().to_lowercase().contains(needle_lower)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    Create {
        name: String,
        value: u64,
        timestamp: DateTime<Utc>,
    },
    Decrypt {
        name: String,
        value: u64,
        timestamp: DateTime<Utc>,
    },
}

impl HistoryEntry {
    pub fn create(name: impl Into<String>, value: u64) -> Self {
        Self::Create {
            name: name.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn decrypt(name: impl Into<String>, value: u64) -> Self {
        Self::Decrypt {
            name: name.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> HistoryKind {
        match self {
            Self::Create { .. } => HistoryKind::Create,
            Self::Decrypt { .. } => HistoryKind::Decrypt,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Create { name, .. } | Self::Decrypt { name, .. } => name,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            Self::Create { value, .. } | Self::Decrypt { value, .. } => *value,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Create { timestamp, .. } | Self::Decrypt { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Create,
    Decrypt,
}

impl HistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Decrypt => "decrypt",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "decrypt" => Some(Self::Decrypt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_commands: usize,
    pub verified_commands: usize,
    pub avg_response_time: f64,
    pub active_users: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    #[default]
    Pending,
    Success,
    Error,
}

/// Contents of the single status slot. `generation` increases with every
/// posted status and is left untouched when the slot is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingStatus {
    pub visible: bool,
    pub phase: StatusPhase,
    pub message: String,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(is_verified: bool, decrypted_value: u64) -> VoiceCommand {
        VoiceCommand {
            id: CommandId::new("command-1"),
            name: "Dim lights".into(),
            ciphertext: CiphertextHandle::new("h1"),
            timestamp_secs: 1_700_000_000,
            creator: ActorAddress::new("0xAbC"),
            public_value1: 4,
            public_value2: 0,
            is_verified,
            decrypted_value,
        }
    }

    #[test]
    fn unverified_value_is_not_authoritative() {
        assert_eq!(command(false, 9).authoritative_value(), None);
        assert_eq!(command(true, 9).authoritative_value(), Some(9));
    }

    #[test]
    fn search_matches_name_or_creator_case_insensitively() {
        let cmd = command(false, 0);
        assert!(cmd.matches_search("dim"));
        assert!(cmd.matches_search("0xabc"));
        assert!(!cmd.matches_search("thermostat"));
    }

    #[test]
    fn history_entry_serializes_with_type_tag() {
        let entry = HistoryEntry::decrypt("Dim lights", 42);
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["type"], "decrypt");
        assert_eq!(json["value"], 42);
        assert_eq!(entry.kind(), HistoryKind::Decrypt);
        assert_eq!(HistoryKind::parse(entry.kind().as_str()), Some(HistoryKind::Decrypt));
    }
}
