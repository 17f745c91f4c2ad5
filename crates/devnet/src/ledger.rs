use std::{
    collections::{HashMap, HashSet},
    slice,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use fhe_services::{
    abi::decode_clear_values, CreateRecordRequest, LedgerError, LedgerReader, LedgerRecord,
    LedgerWriter, TransactionHandle, TransactionReceipt,
};
use shared::domain::{ActorAddress, CiphertextHandle, CommandId, ContractAddress};
use tracing::debug;

use crate::keys::DevnetKeys;

struct StoredRecord {
    record: LedgerRecord,
    handle: CiphertextHandle,
    label: String,
}

#[derive(Default)]
struct LedgerState {
    order: Vec<CommandId>,
    records: HashMap<CommandId, StoredRecord>,
    receipts: HashMap<String, u64>,
    block_number: u64,
    seeded: u64,
    failing_reads: HashSet<CommandId>,
    listing_failure: Option<String>,
    reject_next_submission: bool,
    race_next_verification: bool,
    verification_submissions: usize,
}

impl LedgerState {
    fn mine(&mut self) -> TransactionHandle {
        self.block_number += 1;
        let hash = format!("0x{:064x}", self.block_number);
        self.receipts.insert(hash.clone(), self.block_number);
        TransactionHandle { hash }
    }
}

/// Single-contract record store with the read and verification entry points
/// of the voice command contract. Writes go through a [`DevnetSigner`].
pub struct DevnetLedger {
    address: ContractAddress,
    keys: Arc<DevnetKeys>,
    state: Mutex<LedgerState>,
    available: AtomicBool,
}

impl DevnetLedger {
    pub(crate) fn new(address: ContractAddress, keys: Arc<DevnetKeys>) -> Self {
        Self {
            address,
            keys,
            state: Mutex::new(LedgerState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Write access bound to `actor`, the way a wallet-connected contract
    /// instance signs as its account.
    pub fn signer(self: &Arc<Self>, actor: ActorAddress) -> Arc<DevnetSigner> {
        Arc::new(DevnetSigner {
            ledger: Arc::clone(self),
            actor,
        })
    }

    /// Commits a record as if another actor had created it.
    pub fn seed_record(
        &self,
        creator: ActorAddress,
        name: &str,
        category_code: u64,
        value: u64,
    ) -> CommandId {
        let (handle, _) = self.keys.seal(&self.address, &creator, value);
        let mut state = self.state();
        state.seeded += 1;
        let id = CommandId::new(format!("seed-{}", state.seeded));
        state.order.push(id.clone());
        state.records.insert(
            id.clone(),
            StoredRecord {
                record: LedgerRecord {
                    name: name.to_string(),
                    timestamp_secs: Utc::now().timestamp(),
                    creator,
                    public_value1: category_code,
                    public_value2: 0,
                    is_verified: false,
                    decrypted_value: 0,
                },
                handle,
                label: "seeded".into(),
            },
        );
        state.mine();
        id
    }

    /// Marks `id` verified with its true plaintext, as another actor's
    /// accepted proof would.
    pub fn verify_externally(&self, id: &CommandId) -> anyhow::Result<()> {
        let mut state = self.state();
        self.mark_verified(&mut state, id)?;
        state.mine();
        Ok(())
    }

    pub fn fail_reads_for(&self, id: &CommandId) {
        self.state().failing_reads.insert(id.clone());
    }

    pub fn restore_reads_for(&self, id: &CommandId) {
        self.state().failing_reads.remove(id);
    }

    pub fn fail_listing(&self, message: impl Into<String>) {
        self.state().listing_failure = Some(message.into());
    }

    pub fn restore_listing(&self) {
        self.state().listing_failure = None;
    }

    /// The next write is refused by the wallet.
    pub fn reject_next_submission(&self) {
        self.state().reject_next_submission = true;
    }

    /// The next proof submission loses a race against another verifier.
    pub fn race_next_verification(&self) {
        self.state().race_next_verification = true;
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.state().order.len()
    }

    pub fn record_label(&self, id: &CommandId) -> Option<String> {
        self.state()
            .records
            .get(id)
            .map(|stored| stored.label.clone())
    }

    pub fn verification_submissions(&self) -> usize {
        self.state().verification_submissions
    }

    fn create(
        &self,
        actor: &ActorAddress,
        request: CreateRecordRequest,
    ) -> anyhow::Result<TransactionHandle> {
        let mut state = self.state();
        if std::mem::take(&mut state.reject_next_submission) {
            return Err(LedgerError::UserRejected.into());
        }
        if state.records.contains_key(&request.id) {
            return Err(LedgerError::RecordExists { id: request.id }.into());
        }
        if self.keys.input_proof(&request.ciphertext, actor) != request.input_proof {
            return Err(LedgerError::Reverted("invalid input proof".into()).into());
        }

        debug!(command_id = %request.id, actor = %actor, "devnet: record created");
        state.order.push(request.id.clone());
        state.records.insert(
            request.id,
            StoredRecord {
                record: LedgerRecord {
                    name: request.name,
                    timestamp_secs: Utc::now().timestamp(),
                    creator: actor.clone(),
                    public_value1: request.category_code,
                    public_value2: request.secondary_code,
                    is_verified: false,
                    decrypted_value: 0,
                },
                handle: request.ciphertext,
                label: request.label,
            },
        );
        Ok(state.mine())
    }

    fn verify(
        &self,
        id: &CommandId,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> anyhow::Result<TransactionHandle> {
        let mut state = self.state();
        state.verification_submissions += 1;
        if std::mem::take(&mut state.race_next_verification) {
            self.mark_verified(&mut state, id)?;
            state.mine();
            return Err(LedgerError::AlreadyVerified { id: id.clone() }.into());
        }

        {
            let stored = state
                .records
                .get_mut(id)
                .ok_or_else(|| LedgerError::RecordNotFound { id: id.clone() })?;
            if stored.record.is_verified {
                return Err(LedgerError::AlreadyVerified { id: id.clone() }.into());
            }
            let values = decode_clear_values(encoded_clear_values)
                .map_err(|err| LedgerError::Reverted(err.to_string()))?;
            let [value] = values.as_slice() else {
                return Err(LedgerError::Reverted(format!(
                    "expected one clear value, got {}",
                    values.len()
                ))
                .into());
            };
            let expected = self
                .keys
                .decryption_proof(slice::from_ref(&stored.handle), encoded_clear_values);
            if expected != proof {
                return Err(LedgerError::InvalidProof { id: id.clone() }.into());
            }
            stored.record.is_verified = true;
            stored.record.decrypted_value = *value;
        }

        debug!(command_id = %id, "devnet: decryption verified");
        Ok(state.mine())
    }

    fn mark_verified(&self, state: &mut LedgerState, id: &CommandId) -> anyhow::Result<()> {
        let stored = state
            .records
            .get_mut(id)
            .ok_or_else(|| LedgerError::RecordNotFound { id: id.clone() })?;
        let value = self
            .keys
            .plaintext(&stored.handle)
            .ok_or_else(|| anyhow!("no plaintext registered for {}", stored.handle))?;
        stored.record.is_verified = true;
        stored.record.decrypted_value = value;
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerReader for DevnetLedger {
    async fn contract_address(&self) -> anyhow::Result<ContractAddress> {
        Ok(self.address.clone())
    }

    async fn list_identifiers(&self) -> anyhow::Result<Vec<CommandId>> {
        let state = self.state();
        if let Some(message) = &state.listing_failure {
            return Err(anyhow!("{message}"));
        }
        Ok(state.order.clone())
    }

    async fn get_record(&self, id: &CommandId) -> anyhow::Result<LedgerRecord> {
        let state = self.state();
        if state.failing_reads.contains(id) {
            return Err(anyhow!("rpc timeout reading {id}"));
        }
        state
            .records
            .get(id)
            .map(|stored| stored.record.clone())
            .ok_or_else(|| LedgerError::RecordNotFound { id: id.clone() }.into())
    }

    async fn get_ciphertext_handle(&self, id: &CommandId) -> anyhow::Result<CiphertextHandle> {
        self.state()
            .records
            .get(id)
            .map(|stored| stored.handle.clone())
            .ok_or_else(|| LedgerError::RecordNotFound { id: id.clone() }.into())
    }

    async fn is_available(&self) -> anyhow::Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

pub struct DevnetSigner {
    ledger: Arc<DevnetLedger>,
    actor: ActorAddress,
}

impl DevnetSigner {
    pub fn actor(&self) -> &ActorAddress {
        &self.actor
    }
}

#[async_trait]
impl LedgerWriter for DevnetSigner {
    async fn create_record(
        &self,
        request: CreateRecordRequest,
    ) -> anyhow::Result<TransactionHandle> {
        self.ledger.create(&self.actor, request)
    }

    async fn submit_decryption_proof(
        &self,
        id: &CommandId,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> anyhow::Result<TransactionHandle> {
        self.ledger.verify(id, encoded_clear_values, proof)
    }

    async fn await_finality(&self, tx: &TransactionHandle) -> anyhow::Result<TransactionReceipt> {
        let block_number = self
            .ledger
            .state()
            .receipts
            .get(&tx.hash)
            .copied()
            .ok_or_else(|| anyhow!("unknown transaction {}", tx.hash))?;
        Ok(TransactionReceipt {
            hash: tx.hash.clone(),
            block_number,
        })
    }
}
