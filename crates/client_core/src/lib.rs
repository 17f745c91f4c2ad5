use std::{
    collections::{HashMap, HashSet},
    slice,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Context;
use chrono::Utc;
use fhe_services::{
    is_already_verified, CreateRecordRequest, DecryptionOracle, EncryptionService,
    IdentityProvider, LedgerReader, LedgerWriter, MissingDecryptionOracle,
    MissingEncryptionService, MissingLedger, StaticIdentity,
};
use shared::{
    domain::{
        ActorAddress, CommandId, ContractAddress, HistoryEntry, PendingStatus, UsageStats,
        VoiceCommand,
    },
    draft::CommandDraft,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub mod config;
mod durable_history;
pub mod error;
pub mod history;
pub mod stats;
pub mod status;
pub mod store;

pub use config::Settings;
pub use durable_history::DurableHistoryLog;
pub use error::CoordinatorError;
pub use history::{EphemeralHistoryLog, HistoryLog, HistoryShadow};
pub use store::{CommandStore, RefreshOutcome};

use status::StatusChannel;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_ID_PREFIX: &str = "command-";

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    StatusChanged(PendingStatus),
    StoreRefreshed { loaded: usize, skipped: usize },
    HistoryAppended(HistoryEntry),
}

/// External collaborators the coordinator drives.
pub struct CoordinatorServices {
    pub ledger: Arc<dyn LedgerReader>,
    pub ledger_writer: Arc<dyn LedgerWriter>,
    pub encryption: Arc<dyn EncryptionService>,
    pub oracle: Arc<dyn DecryptionOracle>,
    pub identity: Arc<dyn IdentityProvider>,
    pub history_log: Arc<dyn HistoryLog>,
}

impl CoordinatorServices {
    pub fn missing() -> Self {
        Self {
            ledger: Arc::new(MissingLedger),
            ledger_writer: Arc::new(MissingLedger),
            encryption: Arc::new(MissingEncryptionService),
            oracle: Arc::new(MissingDecryptionOracle),
            identity: Arc::new(StaticIdentity::disconnected()),
            history_log: Arc::new(EphemeralHistoryLog),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BusyKind {
    Creating,
    Refreshing,
    Decrypting(CommandId),
}

impl BusyKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Creating => "create",
            Self::Refreshing => "refresh",
            Self::Decrypting(_) => "decryption",
        }
    }
}

#[derive(Debug, Default)]
struct BusyFlags {
    creating: bool,
    refreshing: bool,
    decrypting: HashSet<CommandId>,
}

impl BusyFlags {
    fn try_set(&mut self, kind: &BusyKind) -> bool {
        match kind {
            BusyKind::Creating => !std::mem::replace(&mut self.creating, true),
            BusyKind::Refreshing => !std::mem::replace(&mut self.refreshing, true),
            BusyKind::Decrypting(id) => self.decrypting.insert(id.clone()),
        }
    }

    fn release(&mut self, kind: &BusyKind) {
        match kind {
            BusyKind::Creating => self.creating = false,
            BusyKind::Refreshing => self.refreshing = false,
            BusyKind::Decrypting(id) => {
                self.decrypting.remove(id);
            }
        }
    }
}

/// Everything a session mutates. Lives exactly as long as its coordinator.
#[derive(Default)]
struct SessionState {
    store: CommandStore,
    history: HistoryShadow,
    history_seeded: bool,
    draft: CommandDraft,
    local_clear_values: HashMap<CommandId, u64>,
    busy: BusyFlags,
    contract_address: Option<ContractAddress>,
    last_issued_millis: i64,
}

struct BusyGuard<'a> {
    state: &'a Mutex<SessionState>,
    kind: BusyKind,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock_state(self.state).busy.release(&self.kind);
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct VoiceCommandCoordinator {
    settings: Settings,
    services: CoordinatorServices,
    state: Mutex<SessionState>,
    fhe_init: tokio::sync::Mutex<()>,
    status: StatusChannel,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl VoiceCommandCoordinator {
    pub fn new(settings: Settings) -> Arc<Self> {
        Self::new_with_dependencies(settings, CoordinatorServices::missing())
    }

    pub fn new_with_dependencies(settings: Settings, services: CoordinatorServices) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let status = StatusChannel::new(
            events.clone(),
            settings.success_clear_after(),
            settings.error_clear_after(),
        );
        Arc::new(Self {
            settings,
            services,
            state: Mutex::new(SessionState::default()),
            fhe_init: tokio::sync::Mutex::new(()),
            status,
            events,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PendingStatus {
        self.status.current()
    }

    pub fn commands(&self) -> Arc<[VoiceCommand]> {
        self.state().store.snapshot()
    }

    pub fn command(&self, id: &CommandId) -> Option<VoiceCommand> {
        self.state().store.get(id).cloned()
    }

    /// Case-insensitive match on name or creator, in store order.
    pub fn search(&self, term: &str) -> Vec<VoiceCommand> {
        let needle = term.trim().to_lowercase();
        let snapshot = self.commands();
        if needle.is_empty() {
            return snapshot.to_vec();
        }
        snapshot
            .iter()
            .filter(|command| command.matches_search(&needle))
            .cloned()
            .collect()
    }

    pub fn usage_stats(&self) -> UsageStats {
        stats::compute_usage_stats(&self.commands())
    }

    pub fn recent_history(&self) -> Vec<HistoryEntry> {
        self.recent_history_with_limit(self.settings.history_display_limit)
    }

    pub fn recent_history_with_limit(&self, limit: usize) -> Vec<HistoryEntry> {
        self.state().history.recent(limit).to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.state().history.len()
    }

    pub fn draft(&self) -> CommandDraft {
        self.state().draft.clone()
    }

    pub fn set_draft(&self, draft: CommandDraft) {
        self.state().draft = draft;
    }

    /// Clear value revealed to this session but not yet confirmed on-chain by
    /// a refresh.
    pub fn local_clear_value(&self, id: &CommandId) -> Option<u64> {
        self.state().local_clear_values.get(id).copied()
    }

    pub fn is_creating(&self) -> bool {
        self.state().busy.creating
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().busy.refreshing
    }

    pub fn is_decrypting(&self, id: &CommandId) -> bool {
        self.state().busy.decrypting.contains(id)
    }

    /// FHE runtime setup, durable history seeding, then the initial load.
    pub async fn start_session(&self) -> Result<RefreshOutcome, CoordinatorError> {
        if !self.services.identity.is_connected() {
            debug!("session: start skipped; no connected actor");
            return Ok(RefreshOutcome::Disconnected);
        }

        self.ensure_fhe_ready()
            .await
            .map_err(|err| self.report("session", err))?;
        self.seed_history().await;
        self.refresh().await
    }

    pub async fn check_availability(&self) -> Result<bool, CoordinatorError> {
        match self.services.ledger.is_available().await {
            Ok(true) => {
                self.status.success("FHE System is available!");
                Ok(true)
            }
            Ok(false) => {
                info!("session: ledger reports FHE system unavailable");
                Ok(false)
            }
            Err(err) => Err(self.report(
                "availability",
                CoordinatorError::AvailabilityCheckFailed(format!("{err:#}")),
            )),
        }
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, CoordinatorError> {
        if !self.services.identity.is_connected() {
            debug!("store: refresh skipped; no connected actor");
            return Ok(RefreshOutcome::Disconnected);
        }
        let Ok(_busy) = self.try_acquire(BusyKind::Refreshing) else {
            debug!("store: refresh already in flight; request dropped");
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let ids = match self.services.ledger.list_identifiers().await {
            Ok(ids) => ids,
            Err(err) => {
                error!("store: failed to list record identifiers: {err:#}");
                return Err(self.report(
                    "refresh",
                    CoordinatorError::LoadFailed(format!("{err:#}")),
                ));
            }
        };

        let mut commands = Vec::with_capacity(ids.len());
        let mut skipped = 0;
        for id in ids {
            match self.fetch_command(&id).await {
                Ok(command) => commands.push(command),
                Err(err) => {
                    skipped += 1;
                    warn!(
                        command_id = %id,
                        "store: skipping record that failed to load: {err:#}"
                    );
                }
            }
        }

        let loaded = commands.len();
        {
            let mut state = self.state();
            {
                let confirmed: HashSet<&CommandId> = commands
                    .iter()
                    .filter(|command| command.is_verified)
                    .map(|command| &command.id)
                    .collect();
                state
                    .local_clear_values
                    .retain(|id, _| !confirmed.contains(id));
            }
            state.store.replace(commands);
        }
        info!(loaded, skipped, "store: refresh complete");
        let _ = self
            .events
            .send(CoordinatorEvent::StoreRefreshed { loaded, skipped });
        Ok(RefreshOutcome::Completed { loaded, skipped })
    }

    /// Submits the session's current draft.
    pub async fn submit_draft(&self) -> Result<CommandId, CoordinatorError> {
        let draft = self.draft();
        self.create(draft).await
    }

    pub async fn create(&self, draft: CommandDraft) -> Result<CommandId, CoordinatorError> {
        let _busy = self.try_acquire(BusyKind::Creating)?;
        self.create_inner(draft)
            .await
            .map_err(|err| self.report("create", err))
    }

    /// Returns the clear value, or `None` when another actor verified the
    /// record first; the caller then reads the value from the refreshed store.
    pub async fn request_decryption(
        &self,
        id: &CommandId,
    ) -> Result<Option<u64>, CoordinatorError> {
        let actor = self
            .require_actor()
            .map_err(|err| self.report("decrypt", err))?;
        let _busy = self.try_acquire(BusyKind::Decrypting(id.clone()))?;
        self.decrypt_inner(id, &actor)
            .await
            .map_err(|err| self.report("decrypt", err))
    }

    async fn create_inner(&self, draft: CommandDraft) -> Result<CommandId, CoordinatorError> {
        let actor = self.require_actor()?;
        let validated = draft.validate()?;
        self.ensure_fhe_ready().await?;
        let target = self.target_address().await.map_err(|err| {
            CoordinatorError::SubmissionFailed(format!("contract address unavailable: {err:#}"))
        })?;

        self.status
            .pending("Creating voice command with FHE encryption...");
        let encrypted = self
            .services
            .encryption
            .encrypt(&target, &actor, validated.value)
            .await
            .map_err(|err| CoordinatorError::EncryptionFailed(format!("{err:#}")))?;

        let id = self.next_command_id();
        info!(command_id = %id, actor = %actor, "create: submitting encrypted command");
        let tx = self
            .services
            .ledger_writer
            .create_record(CreateRecordRequest {
                id: id.clone(),
                name: validated.name.clone(),
                ciphertext: encrypted.handle,
                input_proof: encrypted.input_proof,
                category_code: validated.category_code,
                secondary_code: self.settings.secondary_code,
                label: self.settings.record_label.clone(),
            })
            .await
            .map_err(CoordinatorError::from_submission)?;

        self.status.pending("Waiting for transaction confirmation...");
        let receipt = self
            .services
            .ledger_writer
            .await_finality(&tx)
            .await
            .map_err(CoordinatorError::from_submission)?;
        info!(
            command_id = %id,
            tx = %receipt.hash,
            block = receipt.block_number,
            "create: record finalized"
        );

        self.append_history(HistoryEntry::create(validated.name, validated.value))
            .await;
        self.refresh_after_write("create").await;
        self.state().draft = CommandDraft::default();
        self.status.success("Voice command created successfully!");
        Ok(id)
    }

    async fn decrypt_inner(
        &self,
        id: &CommandId,
        actor: &ActorAddress,
    ) -> Result<Option<u64>, CoordinatorError> {
        let record = self
            .services
            .ledger
            .get_record(id)
            .await
            .map_err(|err| CoordinatorError::decryption("failed to read record", &err))?;
        if record.is_verified {
            debug!(command_id = %id, "decrypt: already verified; oracle not contacted");
            self.status.success("Data already verified on-chain");
            return Ok(Some(record.decrypted_value));
        }

        let handle = self
            .services
            .ledger
            .get_ciphertext_handle(id)
            .await
            .map_err(|err| CoordinatorError::decryption("failed to read ciphertext handle", &err))?;
        let target = self
            .target_address()
            .await
            .map_err(|err| CoordinatorError::decryption("contract address unavailable", &err))?;

        info!(command_id = %id, actor = %actor, "decrypt: requesting decryption proof");
        self.status.pending("Requesting decryption proof...");
        let bundle = match self
            .services
            .oracle
            .verify_decryption(slice::from_ref(&handle), &target)
            .await
        {
            Ok(bundle) => bundle,
            Err(err) if is_already_verified(&err) => {
                return self.settle_verification_race(id).await;
            }
            Err(err) => return Err(CoordinatorError::decryption("decryption oracle", &err)),
        };
        let clear_value = bundle.clear_values.get(&handle).copied().ok_or_else(|| {
            CoordinatorError::DecryptionFailed(format!(
                "oracle returned no clear value for handle {handle}"
            ))
        })?;

        self.status.pending("Verifying decryption on-chain...");
        let submitted = match self
            .services
            .ledger_writer
            .submit_decryption_proof(id, &bundle.encoded_clear_values, &bundle.proof)
            .await
        {
            Ok(tx) => self.services.ledger_writer.await_finality(&tx).await,
            Err(err) => Err(err),
        };
        match submitted {
            Ok(receipt) => info!(
                command_id = %id,
                tx = %receipt.hash,
                block = receipt.block_number,
                "decrypt: proof accepted on-chain"
            ),
            Err(err) if is_already_verified(&err) => {
                return self.settle_verification_race(id).await;
            }
            Err(err) => {
                return Err(CoordinatorError::decryption(
                    "proof submission failed",
                    &err,
                ))
            }
        }

        self.state()
            .local_clear_values
            .insert(id.clone(), clear_value);
        self.append_history(HistoryEntry::decrypt(record.name, clear_value))
            .await;
        self.refresh_after_write("decrypt").await;
        self.status.success("Voice command decrypted successfully!");
        Ok(Some(clear_value))
    }

    async fn settle_verification_race(
        &self,
        id: &CommandId,
    ) -> Result<Option<u64>, CoordinatorError> {
        info!(command_id = %id, "decrypt: record verified concurrently; settling from ledger");
        self.refresh_after_write("decrypt").await;
        self.status.success("Data is already verified on-chain");
        Ok(None)
    }

    async fn ensure_fhe_ready(&self) -> Result<(), CoordinatorError> {
        if self.services.encryption.is_initialized() {
            return Ok(());
        }
        // Concurrent callers wait for the setup already in flight.
        let _init = self.fhe_init.lock().await;
        if self.services.encryption.is_initialized() {
            return Ok(());
        }
        self.services.encryption.initialize().await.map_err(|err| {
            error!("session: FHE runtime initialization failed: {err:#}");
            CoordinatorError::FheInitFailed(format!("{err:#}"))
        })?;
        info!("session: FHE runtime initialized");
        Ok(())
    }

    async fn seed_history(&self) {
        let already_seeded = std::mem::replace(&mut self.state().history_seeded, true);
        if already_seeded {
            return;
        }
        match self.services.history_log.load_all().await {
            Ok(persisted) => {
                let count = persisted.len();
                self.state().history.seed(persisted);
                debug!(count, "history: seeded from durable log");
            }
            Err(err) => {
                self.state().history_seeded = false;
                warn!("history: failed to load durable log: {err:#}");
            }
        }
    }

    async fn append_history(&self, entry: HistoryEntry) {
        self.state().history.append(entry.clone());
        let _ = self
            .events
            .send(CoordinatorEvent::HistoryAppended(entry.clone()));
        if let Err(err) = self.services.history_log.append(&entry).await {
            warn!(
                kind = entry.kind().as_str(),
                "history: failed to persist entry: {err:#}"
            );
        }
    }

    async fn refresh_after_write(&self, operation: &'static str) {
        match self.refresh().await {
            Ok(RefreshOutcome::Completed { .. }) => {}
            Ok(outcome) => warn!(
                operation,
                ?outcome,
                "store: post-write refresh did not run; store may lag the ledger"
            ),
            Err(err) => warn!(operation, "store: post-write refresh failed: {err}"),
        }
    }

    async fn fetch_command(&self, id: &CommandId) -> anyhow::Result<VoiceCommand> {
        let record = self
            .services
            .ledger
            .get_record(id)
            .await
            .with_context(|| format!("getRecord({id})"))?;
        let ciphertext = self
            .services
            .ledger
            .get_ciphertext_handle(id)
            .await
            .with_context(|| format!("getCiphertextHandle({id})"))?;
        Ok(VoiceCommand {
            id: id.clone(),
            name: record.name,
            ciphertext,
            timestamp_secs: record.timestamp_secs,
            creator: record.creator,
            public_value1: record.public_value1,
            public_value2: record.public_value2,
            is_verified: record.is_verified,
            decrypted_value: record.decrypted_value,
        })
    }

    async fn target_address(&self) -> anyhow::Result<ContractAddress> {
        let cached = self.state().contract_address.clone();
        if let Some(address) = cached {
            return Ok(address);
        }
        let address = self.services.ledger.contract_address().await?;
        self.state().contract_address = Some(address.clone());
        Ok(address)
    }

    fn require_actor(&self) -> Result<ActorAddress, CoordinatorError> {
        if !self.services.identity.is_connected() {
            return Err(CoordinatorError::ConnectivityRequired);
        }
        self.services
            .identity
            .current_actor()
            .ok_or(CoordinatorError::ConnectivityRequired)
    }

    /// `command-<unix millis>`, strictly increasing within this session.
    fn next_command_id(&self) -> CommandId {
        let now = Utc::now().timestamp_millis();
        let mut state = self.state();
        let millis = now.max(state.last_issued_millis + 1);
        state.last_issued_millis = millis;
        CommandId::new(format!("{COMMAND_ID_PREFIX}{millis}"))
    }

    fn try_acquire(&self, kind: BusyKind) -> Result<BusyGuard<'_>, CoordinatorError> {
        if !self.state().busy.try_set(&kind) {
            debug!(operation = kind.label(), "busy: re-entrant request rejected");
            return Err(CoordinatorError::Busy(kind.label()));
        }
        Ok(BusyGuard {
            state: &self.state,
            kind,
        })
    }

    /// Puts a failure on the status slot. Busy rejections leave the slot alone.
    fn report(&self, operation: &'static str, err: CoordinatorError) -> CoordinatorError {
        if !err.is_busy() {
            warn!(operation, "{err}");
            self.status.error(err.to_string());
        }
        err
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
