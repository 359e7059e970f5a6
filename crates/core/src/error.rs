use confidant_crypto::EnclaveError;
use confidant_storage::StoreError;
use confidant_types::{CodecError, MessageHash};

/// Failure taxonomy of the mediator's public operations.
///
/// Hard privacy rules never auto-recover; peer I/O is best-effort and handled
/// inside the operations (a suppressed publish failure never appears here).
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("transaction {0} was not found")]
    TransactionNotFound(MessageHash),
    #[error("privacy violation: {0}")]
    PrivacyViolation(String),
    #[error("no managed key can decrypt payload {0}")]
    KeyNotFound(MessageHash),
    #[error("no recipient key found for payload {0}")]
    NoRecipientKeyFound(MessageHash),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Enclave(#[from] EnclaveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
