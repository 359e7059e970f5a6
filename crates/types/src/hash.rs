use serde::{Deserialize, Serialize};

use crate::b64;

/// Width of a payload content address (SHA3-512).
pub const DIGEST_BYTES: usize = 64;

/// Content address of a stored payload, derived from its cipher-text.
///
/// The same digest appears under two names: `MessageHash` at the storage and
/// API boundary, [`TxHash`] inside payload dependency graphs. Converting
/// between the two copies bytes and never re-hashes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageHash(#[serde(with = "serde_bytes")] Vec<u8>);

/// A reference from one payload to a prior payload it depends on.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(#[serde(with = "serde_bytes")] Vec<u8>);

macro_rules! digest_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(bytes: Vec<u8>) -> Self {
                $name(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn to_base64(&self) -> String {
                b64::encode(&self.0)
            }

            pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
                Ok($name(b64::decode(encoded)?))
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                $name(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let encoded = self.to_base64();
                write!(f, "{}…", &encoded[..12.min(encoded.len())])
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_base64())
            }
        }
    };
}

digest_newtype!(MessageHash);
digest_newtype!(TxHash);

impl From<MessageHash> for TxHash {
    fn from(hash: MessageHash) -> Self {
        TxHash(hash.0)
    }
}

impl From<TxHash> for MessageHash {
    fn from(hash: TxHash) -> Self {
        MessageHash(hash.0)
    }
}

impl From<&MessageHash> for TxHash {
    fn from(hash: &MessageHash) -> Self {
        TxHash(hash.0.clone())
    }
}

impl From<&TxHash> for MessageHash {
    fn from(hash: &TxHash) -> Self {
        MessageHash(hash.0.clone())
    }
}
