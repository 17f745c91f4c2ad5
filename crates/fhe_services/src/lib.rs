//! Contracts of the external collaborators the coordinator drives: the ledger
//! (read and write entry points), the FHE encryption runtime, the decryption
//! oracle and the wallet/session identity provider.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    sync::RwLock,
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{ActorAddress, CiphertextHandle, CommandId, ContractAddress};

pub mod abi;
pub mod error;

pub use error::{is_already_verified, is_user_rejection, LedgerError};

/// Record fields as returned by the ledger's `getRecord` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub name: String,
    pub timestamp_secs: i64,
    pub creator: ActorAddress,
    pub public_value1: u64,
    pub public_value2: u64,
    pub is_verified: bool,
    pub decrypted_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRecordRequest {
    pub id: CommandId,
    pub name: String,
    pub ciphertext: CiphertextHandle,
    pub input_proof: Vec<u8>,
    pub category_code: u64,
    pub secondary_code: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub input_proof: Vec<u8>,
}

/// Phase-one output of the oracle: clear values plus the material the ledger
/// needs to check them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionBundle {
    pub clear_values: HashMap<CiphertextHandle, u64>,
    pub encoded_clear_values: Vec<u8>,
    pub proof: Vec<u8>,
}

#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn contract_address(&self) -> anyhow::Result<ContractAddress>;
    async fn list_identifiers(&self) -> anyhow::Result<Vec<CommandId>>;
    async fn get_record(&self, id: &CommandId) -> anyhow::Result<LedgerRecord>;
    async fn get_ciphertext_handle(&self, id: &CommandId) -> anyhow::Result<CiphertextHandle>;
    async fn is_available(&self) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn create_record(&self, request: CreateRecordRequest)
        -> anyhow::Result<TransactionHandle>;
    async fn submit_decryption_proof(
        &self,
        id: &CommandId,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> anyhow::Result<TransactionHandle>;
    async fn await_finality(&self, tx: &TransactionHandle) -> anyhow::Result<TransactionReceipt>;
}

#[async_trait]
pub trait EncryptionService: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()>;
    fn is_initialized(&self) -> bool;
    async fn encrypt(
        &self,
        target: &ContractAddress,
        actor: &ActorAddress,
        plaintext: u64,
    ) -> anyhow::Result<EncryptedInput>;
}

#[async_trait]
pub trait DecryptionOracle: Send + Sync {
    async fn verify_decryption(
        &self,
        handles: &[CiphertextHandle],
        target: &ContractAddress,
    ) -> anyhow::Result<DecryptionBundle>;
}

pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> Option<ActorAddress>;
    fn is_connected(&self) -> bool;
}

pub struct MissingLedger;

#[async_trait]
impl LedgerReader for MissingLedger {
    async fn contract_address(&self) -> anyhow::Result<ContractAddress> {
        Err(anyhow!("ledger is unavailable"))
    }

    async fn list_identifiers(&self) -> anyhow::Result<Vec<CommandId>> {
        Err(anyhow!("ledger is unavailable"))
    }

    async fn get_record(&self, id: &CommandId) -> anyhow::Result<LedgerRecord> {
        Err(anyhow!("ledger is unavailable; cannot read record {id}"))
    }

    async fn get_ciphertext_handle(&self, id: &CommandId) -> anyhow::Result<CiphertextHandle> {
        Err(anyhow!("ledger is unavailable; cannot read handle for {id}"))
    }

    async fn is_available(&self) -> anyhow::Result<bool> {
        Err(anyhow!("ledger is unavailable"))
    }
}

#[async_trait]
impl LedgerWriter for MissingLedger {
    async fn create_record(
        &self,
        request: CreateRecordRequest,
    ) -> anyhow::Result<TransactionHandle> {
        Err(anyhow!(
            "ledger is unavailable; cannot create record {}",
            request.id
        ))
    }

    async fn submit_decryption_proof(
        &self,
        id: &CommandId,
        _encoded_clear_values: &[u8],
        _proof: &[u8],
    ) -> anyhow::Result<TransactionHandle> {
        Err(anyhow!("ledger is unavailable; cannot verify {id}"))
    }

    async fn await_finality(&self, tx: &TransactionHandle) -> anyhow::Result<TransactionReceipt> {
        Err(anyhow!("ledger is unavailable; cannot await {}", tx.hash))
    }
}

pub struct MissingEncryptionService;

#[async_trait]
impl EncryptionService for MissingEncryptionService {
    async fn initialize(&self) -> anyhow::Result<()> {
        Err(anyhow!("FHE runtime is unavailable"))
    }

    fn is_initialized(&self) -> bool {
        false
    }

    async fn encrypt(
        &self,
        _target: &ContractAddress,
        _actor: &ActorAddress,
        _plaintext: u64,
    ) -> anyhow::Result<EncryptedInput> {
        Err(anyhow!("FHE runtime is unavailable"))
    }
}

pub struct MissingDecryptionOracle;

#[async_trait]
impl DecryptionOracle for MissingDecryptionOracle {
    async fn verify_decryption(
        &self,
        _handles: &[CiphertextHandle],
        _target: &ContractAddress,
    ) -> anyhow::Result<DecryptionBundle> {
        Err(anyhow!("decryption oracle is unavailable"))
    }
}

/// Identity whose address and connectivity are set by the host (wallet
/// connect/disconnect callbacks, tests).
#[derive(Default)]
pub struct StaticIdentity {
    actor: RwLock<Option<ActorAddress>>,
    connected: AtomicBool,
}

impl StaticIdentity {
    pub fn connected(actor: ActorAddress) -> Self {
        Self {
            actor: RwLock::new(Some(actor)),
            connected: AtomicBool::new(true),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connect(&self, actor: ActorAddress) {
        *self.actor.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(actor);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.actor.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<ActorAddress> {
        self.actor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
