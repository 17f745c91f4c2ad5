use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use shared::domain::{ActorAddress, CiphertextHandle, ContractAddress};

/// Stand-in for the network key service: remembers which plaintext sits behind
/// each handle and signs proofs with a per-devnet secret.
pub(crate) struct DevnetKeys {
    secret: Vec<u8>,
    plaintexts: Mutex<HashMap<CiphertextHandle, u64>>,
    next_nonce: AtomicU64,
}

impl DevnetKeys {
    pub(crate) fn new() -> Self {
        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            secret: digest(&[b"devnet-secret".as_slice(), seed.to_be_bytes().as_slice()]),
            plaintexts: Mutex::new(HashMap::new()),
            next_nonce: AtomicU64::new(1),
        }
    }

    pub(crate) fn seal(
        &self,
        target: &ContractAddress,
        actor: &ActorAddress,
        plaintext: u64,
    ) -> (CiphertextHandle, Vec<u8>) {
        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let raw = digest(&[
            self.secret.as_slice(),
            b"handle".as_slice(),
            nonce.to_be_bytes().as_slice(),
            target.as_str().as_bytes(),
            actor.as_str().as_bytes(),
        ]);
        let handle = CiphertextHandle::new(format!("0x{}", URL_SAFE_NO_PAD.encode(raw)));
        self.plaintexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle.clone(), plaintext);
        let proof = self.input_proof(&handle, actor);
        (handle, proof)
    }

    pub(crate) fn input_proof(&self, handle: &CiphertextHandle, actor: &ActorAddress) -> Vec<u8> {
        digest(&[
            self.secret.as_slice(),
            b"input".as_slice(),
            handle.as_str().as_bytes(),
            actor.as_str().as_bytes(),
        ])
    }

    pub(crate) fn plaintext(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.plaintexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(handle)
            .copied()
    }

    pub(crate) fn decryption_proof(&self, handles: &[CiphertextHandle], encoded: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b"decryption");
        for handle in handles {
            hasher.update(handle.as_str().as_bytes());
        }
        hasher.update(encoded);
        hasher.finalize().to_vec()
    }
}

fn digest(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}
