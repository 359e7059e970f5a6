//! Content addressing for payloads.
//!
//! Hashing the same cipher-text on any node yields the same digest; that
//! digest is the cross-node identity of a private transaction.

use confidant_types::MessageHash;
use sha3::{Digest, Sha3_512};

/// Derive the content address of a payload from its cipher-text.
pub fn payload_hash(cipher_text: &[u8]) -> MessageHash {
    let mut hasher = Sha3_512::new();
    hasher.update(cipher_text);
    MessageHash::new(hasher.finalize().to_vec())
}
