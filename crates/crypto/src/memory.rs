//! In-process enclave.
//!
//! Envelope construction: a random 32-byte master key encrypts the plaintext
//! with AES-256-GCM, then the master key is boxed once per recipient under an
//! X25519 shared secret expanded through HKDF-SHA256. Raw transactions box
//! the master key to the sender itself so recipient selection can happen at
//! signed-send time without re-encrypting the plaintext.

use std::collections::{BTreeMap, BTreeSet};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use sha3::{Digest, Sha3_512};
use x25519_dalek::{PublicKey as DhPublicKey, StaticSecret};

use confidant_types::{EncodedPayload, EncryptedRawTransaction, PrivacyMode, PublicKey, TxHash};

use crate::enclave::{Enclave, EnclaveError, RawCiphertext};

const NONCE_BYTES: usize = 12;
const MASTER_KEY_BYTES: usize = 32;
const KDF_CONTEXT: &[u8] = b"confidant.box.v1";

/// Enclave holding its key material in process memory. Key order is stable:
/// the first key is the node's default identity and trial decryption walks
/// the keys in construction order.
pub struct MemoryEnclave {
    keys: Vec<(PublicKey, StaticSecret)>,
    forwarding: Vec<PublicKey>,
}

impl MemoryEnclave {
    /// Build an enclave over explicit secret keys.
    pub fn from_secret_bytes(secrets: &[[u8; 32]]) -> Self {
        let keys = secrets
            .iter()
            .map(|&raw| {
                let secret = StaticSecret::from(raw);
                let public = PublicKey::new(*DhPublicKey::from(&secret).as_bytes());
                (public, secret)
            })
            .collect();
        MemoryEnclave {
            keys,
            forwarding: Vec::new(),
        }
    }

    /// Build an enclave with freshly generated keys.
    pub fn generate(key_count: usize) -> Self {
        let mut secrets = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let mut raw = [0u8; 32];
            OsRng.fill_bytes(&mut raw);
            secrets.push(raw);
        }
        Self::from_secret_bytes(&secrets)
    }

    pub fn with_forwarding_keys(mut self, keys: Vec<PublicKey>) -> Self {
        self.forwarding = keys;
        self
    }

    fn secret_for(&self, key: &PublicKey) -> Result<&StaticSecret, EnclaveError> {
        self.keys
            .iter()
            .find(|(public, _)| public == key)
            .map(|(_, secret)| secret)
            .ok_or(EnclaveError::KeyNotManaged(*key))
    }

    /// X25519 shared secret with `peer`, expanded to an AEAD key.
    fn shared_key(&self, secret: &StaticSecret, peer: &PublicKey) -> [u8; 32] {
        let shared = secret.diffie_hellman(&DhPublicKey::from(*peer.as_bytes()));
        let kdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut okm = [0u8; 32];
        // Expand cannot fail for a 32-byte output with SHA-256.
        kdf.expand(KDF_CONTEXT, &mut okm)
            .unwrap_or_else(|_| unreachable!("32-byte HKDF-SHA256 output"));
        okm
    }

    fn build_envelope(
        &self,
        master_key: &[u8; MASTER_KEY_BYTES],
        cipher_text: Vec<u8>,
        cipher_text_nonce: Vec<u8>,
        sender: &PublicKey,
        recipients: &[PublicKey],
        privacy_mode: PrivacyMode,
        affected: &BTreeMap<TxHash, EncodedPayload>,
        exec_hash: &[u8],
    ) -> Result<EncodedPayload, EnclaveError> {
        let secret = self.secret_for(sender)?;
        let recipient_nonce = random_nonce();

        let mut recipient_boxes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let box_key = self.shared_key(secret, recipient);
            recipient_boxes.push(aead_encrypt(&box_key, &recipient_nonce, master_key)?);
        }

        let affected_contract_transactions = affected
            .iter()
            .map(|(tx_hash, acoth)| {
                let hash = security_hash(tx_hash, &acoth.cipher_text, &cipher_text);
                (tx_hash.clone(), hash)
            })
            .collect();

        Ok(EncodedPayload {
            sender_key: *sender,
            cipher_text,
            cipher_text_nonce,
            recipient_boxes,
            recipient_nonce: recipient_nonce.to_vec(),
            recipient_keys: recipients.to_vec(),
            privacy_mode,
            affected_contract_transactions,
            exec_hash: exec_hash.to_vec(),
        })
    }

    fn open_master_key(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<[u8; MASTER_KEY_BYTES], EnclaveError> {
        let secret = self.secret_for(provided_key)?;
        let box_key = self.shared_key(secret, &payload.sender_key);

        // A projected payload carries the box at the recipient's position;
        // inbound payloads before key discovery may carry no keys at all, in
        // which case every box is tried.
        let candidates: Vec<&Vec<u8>> = match payload
            .recipient_keys
            .iter()
            .position(|key| key == provided_key)
        {
            Some(position) => payload.recipient_boxes.get(position).into_iter().collect(),
            None => payload.recipient_boxes.iter().collect(),
        };

        for sealed in candidates {
            if let Ok(master) = aead_decrypt(&box_key, &payload.recipient_nonce, sealed) {
                if let Ok(master) = <[u8; MASTER_KEY_BYTES]>::try_from(master.as_slice()) {
                    return Ok(master);
                }
            }
        }
        Err(EnclaveError::DecryptionFailed)
    }
}

impl Enclave for MemoryEnclave {
    fn default_public_key(&self) -> Result<PublicKey, EnclaveError> {
        self.keys
            .first()
            .map(|(public, _)| *public)
            .ok_or(EnclaveError::NoManagedKeys)
    }

    fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|(public, _)| *public).collect()
    }

    fn forwarding_keys(&self) -> Vec<PublicKey> {
        self.forwarding.clone()
    }

    fn encrypt_payload(
        &self,
        plaintext: &[u8],
        sender: &PublicKey,
        recipients: &[PublicKey],
        privacy_mode: PrivacyMode,
        affected: &BTreeMap<TxHash, EncodedPayload>,
        exec_hash: &[u8],
    ) -> Result<EncodedPayload, EnclaveError> {
        let master_key = random_master_key();
        let cipher_text_nonce = random_nonce();
        let cipher_text = aead_encrypt(&master_key, &cipher_text_nonce, plaintext)?;
        self.build_envelope(
            &master_key,
            cipher_text,
            cipher_text_nonce.to_vec(),
            sender,
            recipients,
            privacy_mode,
            affected,
            exec_hash,
        )
    }

    fn encrypt_raw(
        &self,
        plaintext: &[u8],
        sender: &PublicKey,
    ) -> Result<RawCiphertext, EnclaveError> {
        let secret = self.secret_for(sender)?;
        let master_key = random_master_key();
        let nonce = random_nonce();
        let encrypted_payload = aead_encrypt(&master_key, &nonce, plaintext)?;
        let self_key = self.shared_key(secret, sender);
        let encrypted_key = aead_encrypt(&self_key, &nonce, &master_key)?;
        Ok(RawCiphertext {
            encrypted_payload,
            encrypted_key,
            nonce: nonce.to_vec(),
        })
    }

    fn encrypt_payload_from_raw(
        &self,
        raw: &EncryptedRawTransaction,
        recipients: &[PublicKey],
        privacy_mode: PrivacyMode,
        affected: &BTreeMap<TxHash, EncodedPayload>,
        exec_hash: &[u8],
    ) -> Result<EncodedPayload, EnclaveError> {
        let secret = self.secret_for(&raw.sender)?;
        let self_key = self.shared_key(secret, &raw.sender);
        let master = aead_decrypt(&self_key, &raw.nonce, &raw.encrypted_key)?;
        let master_key = <[u8; MASTER_KEY_BYTES]>::try_from(master.as_slice())
            .map_err(|_| EnclaveError::DecryptionFailed)?;
        self.build_envelope(
            &master_key,
            raw.encrypted_payload.clone(),
            raw.nonce.clone(),
            &raw.sender,
            recipients,
            privacy_mode,
            affected,
            exec_hash,
        )
    }

    fn unencrypt_transaction(
        &self,
        payload: &EncodedPayload,
        provided_key: &PublicKey,
    ) -> Result<Vec<u8>, EnclaveError> {
        let master_key = self.open_master_key(payload, provided_key)?;
        aead_decrypt(&master_key, &payload.cipher_text_nonce, &payload.cipher_text)
    }

    fn find_invalid_security_hashes(
        &self,
        payload: &EncodedPayload,
        resolved: &BTreeMap<TxHash, EncodedPayload>,
    ) -> BTreeSet<TxHash> {
        payload
            .affected_contract_transactions
            .iter()
            .filter(|(tx_hash, claimed)| {
                resolved.get(*tx_hash).is_some_and(|acoth| {
                    security_hash(tx_hash, &acoth.cipher_text, &payload.cipher_text) != **claimed
                })
            })
            .map(|(tx_hash, _)| tx_hash.clone())
            .collect()
    }
}

/// Binds an affected transaction's cipher-text to the new payload's.
fn security_hash(tx_hash: &TxHash, acoth_cipher_text: &[u8], cipher_text: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_512::new();
    hasher.update(tx_hash.as_bytes());
    hasher.update(acoth_cipher_text);
    hasher.update(cipher_text);
    hasher.finalize().to_vec()
}

fn random_master_key() -> [u8; MASTER_KEY_BYTES] {
    let mut key = [0u8; MASTER_KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    key
}

fn random_nonce() -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn aead_encrypt(key: &[u8; 32], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnclaveError> {
    if nonce.len() != NONCE_BYTES {
        return Err(EnclaveError::EncryptionFailed("bad nonce width".into()));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EnclaveError::EncryptionFailed("AEAD seal".into()))
}

fn aead_decrypt(key: &[u8; 32], nonce: &[u8], cipher_text: &[u8]) -> Result<Vec<u8>, EnclaveError> {
    if nonce.len() != NONCE_BYTES {
        return Err(EnclaveError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), cipher_text)
        .map_err(|_| EnclaveError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use confidant_types::MessageHash;

    fn two_nodes() -> (MemoryEnclave, MemoryEnclave) {
        (MemoryEnclave::generate(1), MemoryEnclave::generate(2))
    }

    #[test]
    fn recipient_can_open_cross_node_payload() {
        let (sender_node, recipient_node) = two_nodes();
        let sender = sender_node.default_public_key().unwrap();
        let recipient = recipient_node.public_keys()[1];

        let payload = sender_node
            .encrypt_payload(
                b"private state",
                &sender,
                &[recipient, sender],
                PrivacyMode::StandardPrivate,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();

        let projected = payload.for_recipient(&recipient).unwrap();
        let plaintext = recipient_node
            .unencrypt_transaction(&projected, &recipient)
            .unwrap();
        assert_eq!(plaintext, b"private state");
    }

    #[test]
    fn sender_can_open_own_payload() {
        let (sender_node, recipient_node) = two_nodes();
        let sender = sender_node.default_public_key().unwrap();
        let recipient = recipient_node.public_keys()[0];

        let payload = sender_node
            .encrypt_payload(
                b"echo",
                &sender,
                &[recipient, sender],
                PrivacyMode::StandardPrivate,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();

        assert_eq!(
            sender_node.unencrypt_transaction(&payload, &sender).unwrap(),
            b"echo"
        );
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let (sender_node, recipient_node) = two_nodes();
        let sender = sender_node.default_public_key().unwrap();
        let entitled = recipient_node.public_keys()[0];
        let not_entitled = recipient_node.public_keys()[1];

        let payload = sender_node
            .encrypt_payload(
                b"secret",
                &sender,
                &[entitled],
                PrivacyMode::StandardPrivate,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();

        assert!(matches!(
            recipient_node.unencrypt_transaction(&payload, &not_entitled),
            Err(EnclaveError::DecryptionFailed)
        ));
    }

    #[test]
    fn trial_decrypt_without_recipient_keys() {
        let (sender_node, recipient_node) = two_nodes();
        let sender = sender_node.default_public_key().unwrap();
        let recipient = recipient_node.public_keys()[0];

        let mut projected = sender_node
            .encrypt_payload(
                b"legacy",
                &sender,
                &[recipient],
                PrivacyMode::StandardPrivate,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();
        // Pre-key-discovery inbound payloads have boxes but no keys.
        projected.recipient_keys.clear();

        assert_eq!(
            recipient_node
                .unencrypt_transaction(&projected, &recipient)
                .unwrap(),
            b"legacy"
        );
    }

    #[test]
    fn raw_round_trip_preserves_content_address() {
        let enclave = MemoryEnclave::generate(1);
        let sender = enclave.default_public_key().unwrap();

        let raw_cipher = enclave.encrypt_raw(b"deferred", &sender).unwrap();
        let raw = EncryptedRawTransaction {
            hash: MessageHash::new(vec![0; 64]),
            encrypted_payload: raw_cipher.encrypted_payload.clone(),
            encrypted_key: raw_cipher.encrypted_key,
            nonce: raw_cipher.nonce,
            sender,
        };

        let payload = enclave
            .encrypt_payload_from_raw(
                &raw,
                &[sender],
                PrivacyMode::StandardPrivate,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();

        assert_eq!(payload.cipher_text, raw_cipher.encrypted_payload);
        assert_eq!(
            enclave.unencrypt_transaction(&payload, &sender).unwrap(),
            b"deferred"
        );
    }

    #[test]
    fn security_hash_audit_flags_tampered_references() {
        let enclave = MemoryEnclave::generate(1);
        let sender = enclave.default_public_key().unwrap();

        let prior = enclave
            .encrypt_payload(
                b"prior state",
                &sender,
                &[sender],
                PrivacyMode::PrivateStateValidation,
                &BTreeMap::new(),
                b"exec",
            )
            .unwrap();
        let prior_hash: TxHash = crate::digest::payload_hash(&prior.cipher_text).into();
        let mut resolved = BTreeMap::new();
        resolved.insert(prior_hash.clone(), prior);

        let mut payload = enclave
            .encrypt_payload(
                b"dependent",
                &sender,
                &[sender],
                PrivacyMode::PrivateStateValidation,
                &resolved,
                b"exec",
            )
            .unwrap();

        assert!(enclave
            .find_invalid_security_hashes(&payload, &resolved)
            .is_empty());

        payload
            .affected_contract_transactions
            .insert(prior_hash.clone(), vec![0xFF; 64]);
        let invalid = enclave.find_invalid_security_hashes(&payload, &resolved);
        assert_eq!(invalid, BTreeSet::from([prior_hash]));
    }

    #[test]
    fn unresolved_references_are_not_audited() {
        let enclave = MemoryEnclave::generate(1);
        let sender = enclave.default_public_key().unwrap();
        let mut payload = enclave
            .encrypt_payload(
                b"dangling",
                &sender,
                &[sender],
                PrivacyMode::PartyProtection,
                &BTreeMap::new(),
                &[],
            )
            .unwrap();
        payload
            .affected_contract_transactions
            .insert(TxHash::new(vec![9; 64]), vec![0; 64]);

        assert!(enclave
            .find_invalid_security_hashes(&payload, &BTreeMap::new())
            .is_empty());
    }
}
