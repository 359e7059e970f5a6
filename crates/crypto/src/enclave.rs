use std::collections::{BTreeMap, BTreeSet};

use confidant_types::{EncodedPayload, EncryptedRawTransaction, PrivacyMode, PublicKey, TxHash};

/// Errors surfaced by an enclave implementation.
#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    #[error("key {0} is not managed by this enclave")]
    KeyNotManaged(PublicKey),
    #[error("enclave manages no keys")]
    NoManagedKeys,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Cipher material produced for a raw (pre-finalized) transaction. The master
/// key travels encrypted to the sender itself; recipients are chosen later at
/// signed-send time.
#[derive(Debug, Clone)]
pub struct RawCiphertext {
    pub encrypted_payload: Vec<u8>,
    pub encrypted_key: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// The cryptographic oracle behind the mediator. Owns private keys, builds
/// and opens envelopes, and audits the security hashes binding a payload to
/// the transactions it depends on.
///
/// Implementations must be re-entrant; the mediator calls them from many
/// threads without synchronization.
pub trait Enclave: Send + Sync {
    /// The node's default sending identity.
    fn default_public_key(&self) -> Result<PublicKey, EnclaveError>;

    /// Every key this enclave holds private material for.
    fn public_keys(&self) -> Vec<PublicKey>;

    /// Keys appended as recipients to every outbound payload.
    fn forwarding_keys(&self) -> Vec<PublicKey>;

    /// Build a full envelope: encrypt `plaintext` under a fresh master key,
    /// box the master key for each recipient, and compute one security hash
    /// per resolved affected transaction.
    fn encrypt_payload(
        &self,
        plaintext: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
        privacy_mode: PrivacyMode,
        affected: &BTreeMap<TxHash, EncodedPayload>,
        exec_hash: &[u8],
    ) -> Result<EncodedPayload, EnclaveError>;

    /// Encrypt `plaintext` for the sender only, deferring recipient selection.
    fn encrypt_raw(
        &self,
        plaintext: &[u8],
        sender: &PublicKey,
    ) -> Result<RawCiphertext, EnclaveError>;

    /// Finalize a raw transaction into a full envelope. Reuses the raw
    /// transaction's master key and cipher-text, so the content address is
    /// unchanged.
    fn encrypt_payload_from_raw(
        &self,
        raw: &EncryptedRawTransaction,
        recipients: &[PublicKey],
        privacy_mode: PrivacyMode,
        affected: &BTreeMap<TxHash, EncodedPayload>,
        exec_hash: &[u8],
    ) -> Result<EncodedPayload, EnclaveError>;

    /// Open an envelope with the given managed key and return the plaintext.
    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError>;

    /// Which of the payload's affected-transaction references carry a security
    /// hash that does not match the locally resolved payloads. References that
    /// could not be resolved locally are not auditable and never reported.
    fn find_invalid_security_hashes(
        &self,
        payload: &EncodedPayload,
        resolved: &BTreeMap<TxHash, EncodedPayload>,
    ) -> BTreeSet<TxHash>;
}
