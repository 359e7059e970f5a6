//! Canonical data types for the Confidant transaction mediator: party keys,
//! payload content addresses, the private-transaction envelope and its wire
//! codec, and the two persisted record shapes.

pub mod b64;
pub mod hash;
pub mod keys;
pub mod payload;
pub mod records;
pub mod wire;

pub use hash::{MessageHash, TxHash, DIGEST_BYTES};
pub use keys::{KeyError, PublicKey, KEY_BYTES};
pub use payload::{EncodedPayload, PrivacyMode};
pub use records::{EncryptedRawTransaction, EncryptedTransaction};
pub use wire::CodecError;
