use serde::{Deserialize, Serialize};

use crate::b64;

/// Errors that can occur when parsing a wire-encoded public key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("public key is not valid base64")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("public key must be exactly {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Number of raw bytes in a party public key.
pub const KEY_BYTES: usize = 32;

/// An opaque party identity. Compared by bytes, base64 on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; KEY_BYTES]);

impl PublicKey {
    pub fn new(bytes: [u8; KEY_BYTES]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Wire form of the key.
    pub fn to_base64(&self) -> String {
        b64::encode(&self.0)
    }

    /// Decode the wire form back into a key.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let decoded = b64::decode(encoded)?;
        Self::try_from(decoded.as_slice())
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; KEY_BYTES] = value.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_BYTES,
            actual: value.len(),
        })?;
        Ok(PublicKey(bytes))
    }
}

impl From<[u8; KEY_BYTES]> for PublicKey {
    fn from(value: [u8; KEY_BYTES]) -> Self {
        PublicKey(value)
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.to_base64()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PublicKey::from_base64(&value)
    }
}

/// Abbreviated form for logs; never used on the wire.
impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let encoded = self.to_base64();
        write!(f, "{}…", &encoded[..8.min(encoded.len())])
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}
