use shared::domain::CommandId;
use thiserror::Error;

/// Typed failures a ledger or oracle adapter may attach to its `anyhow::Error`.
///
/// Adapters that only have a remote error string can return it as-is; the
/// classification helpers below fall back to message matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("user rejected transaction")]
    UserRejected,
    #[error("Data already verified for {id}")]
    AlreadyVerified { id: CommandId },
    #[error("record {id} does not exist")]
    RecordNotFound { id: CommandId },
    #[error("record {id} already exists")]
    RecordExists { id: CommandId },
    #[error("decryption proof rejected for {id}")]
    InvalidProof { id: CommandId },
    #[error("transaction reverted: {0}")]
    Reverted(String),
}

fn typed(err: &anyhow::Error) -> Option<&LedgerError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LedgerError>())
}

pub fn is_user_rejection(err: &anyhow::Error) -> bool {
    match typed(err) {
        Some(ledger_err) => matches!(ledger_err, LedgerError::UserRejected),
        None => {
            let message = format!("{err:#}").to_ascii_lowercase();
            message.contains("user rejected") || message.contains("user denied")
        }
    }
}

pub fn is_already_verified(err: &anyhow::Error) -> bool {
    match typed(err) {
        Some(ledger_err) => matches!(ledger_err, LedgerError::AlreadyVerified { .. }),
        None => format!("{err:#}")
            .to_ascii_lowercase()
            .contains("already verified"),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    #[test]
    fn classifies_typed_errors_through_context() {
        let err = anyhow::Error::new(LedgerError::UserRejected).context("sending createRecord");
        assert!(is_user_rejection(&err));
        assert!(!is_already_verified(&err));

        let err: anyhow::Error = Err::<(), _>(LedgerError::AlreadyVerified {
            id: CommandId::new("command-1"),
        })
        .context("verifyDecryption")
        .unwrap_err();
        assert!(is_already_verified(&err));
    }

    #[test]
    fn falls_back_to_message_matching_for_untyped_errors() {
        assert!(is_user_rejection(&anyhow!(
            "MetaMask Tx Signature: User rejected transaction"
        )));
        assert!(is_already_verified(&anyhow!(
            "execution reverted: Data already verified"
        )));
        assert!(!is_already_verified(&anyhow!("nonce too low")));
    }

    #[test]
    fn typed_error_wins_over_misleading_message() {
        let err = anyhow::Error::new(LedgerError::Reverted(
            "proof mentions already verified handles".into(),
        ));
        assert!(!is_already_verified(&err));
    }
}
