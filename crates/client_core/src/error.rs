use fhe_services::{is_user_rejection, LedgerError};
use shared::error::ValidationError;
use thiserror::Error;

/// Coordinator-level failures. The `Display` text is what the status slot
/// shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Please connect wallet first")]
    ConnectivityRequired,
    #[error("FHE runtime initialization failed: {0}")]
    FheInitFailed(String),
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Transaction rejected by user")]
    SubmissionRejectedByUser,
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Availability check failed: {0}")]
    AvailabilityCheckFailed(String),
    #[error("Failed to load data: {0}")]
    LoadFailed(String),
    #[error("{0} already in progress")]
    Busy(&'static str),
}

impl CoordinatorError {
    /// Ledger write failures keep explicit user rejection apart from
    /// everything else.
    pub(crate) fn from_submission(err: anyhow::Error) -> Self {
        if is_user_rejection(&err) {
            Self::SubmissionRejectedByUser
        } else {
            Self::SubmissionFailed(describe(&err))
        }
    }

    pub(crate) fn decryption(context: &str, err: &anyhow::Error) -> Self {
        Self::DecryptionFailed(format!("{context}: {}", describe(err)))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Prefers the typed ledger message when one is attached anywhere in the chain.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<LedgerError>())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{err:#}"))
}
