use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use fhe_services::{
    abi::encode_clear_values, DecryptionBundle, DecryptionOracle, EncryptedInput,
    EncryptionService,
};
use shared::domain::{ActorAddress, CiphertextHandle, ContractAddress};
use tracing::debug;

use crate::keys::DevnetKeys;

/// Encryption runtime and decryption oracle sharing the devnet key material.
pub struct DevnetFhe {
    keys: Arc<DevnetKeys>,
    initialized: AtomicBool,
    fail_init: AtomicBool,
    fail_next_encrypt: AtomicBool,
    encrypt_calls: AtomicUsize,
    oracle_calls: AtomicUsize,
    oracle_failure: Mutex<Option<String>>,
    oracle_latency: Mutex<Duration>,
}

impl DevnetFhe {
    pub(crate) fn new(keys: Arc<DevnetKeys>) -> Self {
        Self {
            keys,
            initialized: AtomicBool::new(false),
            fail_init: AtomicBool::new(false),
            fail_next_encrypt: AtomicBool::new(false),
            encrypt_calls: AtomicUsize::new(0),
            oracle_calls: AtomicUsize::new(0),
            oracle_failure: Mutex::new(None),
            oracle_latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn fail_initialization(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_encrypt(&self) {
        self.fail_next_encrypt.store(true, Ordering::SeqCst);
    }

    /// Every oracle call fails with `message` until cleared with `None`.
    pub fn set_oracle_failure(&self, message: Option<&str>) {
        *self
            .oracle_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = message.map(str::to_string);
    }

    pub fn set_oracle_latency(&self, latency: Duration) {
        *self
            .oracle_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = latency;
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncryptionService for DevnetFhe {
    async fn initialize(&self) -> anyhow::Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            bail!("failed to load FHE public key");
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!("devnet: fhe runtime initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn encrypt(
        &self,
        target: &ContractAddress,
        actor: &ActorAddress,
        plaintext: u64,
    ) -> anyhow::Result<EncryptedInput> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_initialized() {
            bail!("fhe runtime is not initialized");
        }
        if self.fail_next_encrypt.swap(false, Ordering::SeqCst) {
            bail!("relayer rejected encrypted input");
        }
        let (handle, input_proof) = self.keys.seal(target, actor, plaintext);
        Ok(EncryptedInput {
            handle,
            input_proof,
        })
    }
}

#[async_trait]
impl DecryptionOracle for DevnetFhe {
    async fn verify_decryption(
        &self,
        handles: &[CiphertextHandle],
        target: &ContractAddress,
    ) -> anyhow::Result<DecryptionBundle> {
        self.oracle_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self
            .oracle_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .oracle_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(message) = failure {
            bail!(message);
        }

        let mut clear_values = HashMap::with_capacity(handles.len());
        let mut ordered = Vec::with_capacity(handles.len());
        for handle in handles {
            let value = self
                .keys
                .plaintext(handle)
                .ok_or_else(|| anyhow!("unknown ciphertext handle {handle}"))?;
            clear_values.insert(handle.clone(), value);
            ordered.push(value);
        }
        let encoded_clear_values = encode_clear_values(&ordered);
        let proof = self.keys.decryption_proof(handles, &encoded_clear_values);
        debug!(%target, handles = handles.len(), "devnet: public decryption served");

        Ok(DecryptionBundle {
            clear_values,
            encoded_clear_values,
            proof,
        })
    }
}
