use std::collections::{BTreeMap, BTreeSet};

use crate::hash::TxHash;
use crate::keys::PublicKey;
use crate::wire::CodecError;

/// Privacy guarantee attached to a payload.
///
/// The wire flag values are part of the cross-node protocol; flag 2 is
/// reserved and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivacyMode {
    /// Payload visible only to its recipients; no dependency checks.
    #[default]
    StandardPrivate,
    /// Dependencies must carry matching privacy guarantees.
    PartyProtection,
    /// Strictest mode: dependency graph must share one recipient set and an
    /// execution hash accompanies the payload.
    PrivateStateValidation,
}

impl PrivacyMode {
    pub fn as_flag(self) -> u8 {
        match self {
            Self::StandardPrivate => 0,
            Self::PartyProtection => 1,
            Self::PrivateStateValidation => 3,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Self::StandardPrivate),
            1 => Some(Self::PartyProtection),
            3 => Some(Self::PrivateStateValidation),
            _ => None,
        }
    }
}

/// The canonical envelope for one private transaction.
///
/// `recipient_boxes` and `recipient_keys` align by position whenever both are
/// non-empty. `recipient_keys` may be empty on inbound payloads before key
/// discovery. `exec_hash` is a zero-length vector outside
/// [`PrivacyMode::PrivateStateValidation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub sender_key: PublicKey,
    pub cipher_text: Vec<u8>,
    pub cipher_text_nonce: Vec<u8>,
    pub recipient_boxes: Vec<Vec<u8>>,
    pub recipient_nonce: Vec<u8>,
    pub recipient_keys: Vec<PublicKey>,
    pub privacy_mode: PrivacyMode,
    pub affected_contract_transactions: BTreeMap<TxHash, Vec<u8>>,
    pub exec_hash: Vec<u8>,
}

impl EncodedPayload {
    /// Project the envelope down to a single recipient: `recipient_keys`
    /// becomes exactly `[target]` and `recipient_boxes` the box at the
    /// target's original position. Every other field is preserved, including
    /// the affected-transaction map.
    pub fn for_recipient(&self, target: &PublicKey) -> Result<EncodedPayload, CodecError> {
        let position = self
            .recipient_keys
            .iter()
            .position(|key| key == target)
            .ok_or(CodecError::RecipientNotInPayload(*target))?;
        let sealed = self.recipient_boxes.get(position).cloned().ok_or(
            CodecError::RecipientCountMismatch {
                boxes: self.recipient_boxes.len(),
                keys: self.recipient_keys.len(),
            },
        )?;

        Ok(EncodedPayload {
            recipient_boxes: vec![sealed],
            recipient_keys: vec![*target],
            ..self.clone()
        })
    }

    /// Append a recipient key discovered after the fact (backfill of a
    /// sender's own payload). The box list is left untouched.
    pub fn with_recipient_key(mut self, key: PublicKey) -> EncodedPayload {
        self.recipient_keys.push(key);
        self
    }

    /// Drop the given affected-transaction entries. Cipher-text is untouched,
    /// so the content address of the payload does not change.
    pub fn without_affected(mut self, invalid: &BTreeSet<TxHash>) -> EncodedPayload {
        self.affected_contract_transactions
            .retain(|hash, _| !invalid.contains(hash));
        self
    }
}
