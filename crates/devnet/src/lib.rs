//! In-process ledger, FHE runtime and decryption oracle for exercising the
//! coordinator without a chain. Proofs are keyed hashes, not a proof system.

use std::sync::Arc;

use shared::domain::ContractAddress;

mod fhe;
mod keys;
mod ledger;

pub use fhe::DevnetFhe;
pub use ledger::{DevnetLedger, DevnetSigner};

use keys::DevnetKeys;

pub const DEVNET_CONTRACT_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

pub struct Devnet {
    ledger: Arc<DevnetLedger>,
    fhe: Arc<DevnetFhe>,
}

impl Devnet {
    pub fn new() -> Self {
        let keys = Arc::new(DevnetKeys::new());
        Self {
            ledger: Arc::new(DevnetLedger::new(
                ContractAddress::new(DEVNET_CONTRACT_ADDRESS),
                Arc::clone(&keys),
            )),
            fhe: Arc::new(DevnetFhe::new(keys)),
        }
    }

    pub fn ledger(&self) -> Arc<DevnetLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn fhe(&self) -> Arc<DevnetFhe> {
        Arc::clone(&self.fhe)
    }
}

impl Default for Devnet {
    fn default() -> Self {
        Self::new()
    }
}
