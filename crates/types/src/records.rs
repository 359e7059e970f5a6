use serde::{Deserialize, Serialize};

use crate::hash::MessageHash;
use crate::keys::PublicKey;

/// A finalized private transaction as persisted. Identity is `hash`, which is
/// always the content address of the cipher-text inside `encoded_payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTransaction {
    pub hash: MessageHash,
    #[serde(with = "serde_bytes")]
    pub encoded_payload: Vec<u8>,
}

/// A pre-encrypted transaction held only on the originating node until it is
/// finalized through a signed send. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRawTransaction {
    pub hash: MessageHash,
    #[serde(with = "serde_bytes")]
    pub encrypted_payload: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    pub sender: PublicKey,
}
