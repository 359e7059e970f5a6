//! Canonical binary form of [`EncodedPayload`].
//!
//! The layout is a cross-node wire contract: every field is length-prefixed
//! with a big-endian `u64`, sequences carry a leading element count, and the
//! affected-transaction map is emitted in ascending hash order. Decoding is
//! strict: any structural deviation fails, and a decoded payload re-encodes
//! to the exact input bytes.

use std::collections::BTreeMap;

use crate::hash::TxHash;
use crate::keys::{KeyError, PublicKey};
use crate::payload::{EncodedPayload, PrivacyMode};

/// Structural errors raised by [`decode`] and by the single-recipient
/// projection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),
    #[error("declared length of {field} exceeds remaining {remaining} bytes")]
    LengthOutOfBounds { field: &'static str, remaining: usize },
    #[error("unknown privacy flag {0}")]
    UnknownPrivacyFlag(u8),
    #[error("malformed recipient key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("affected-transaction hashes out of order or duplicated")]
    UnorderedAffectedHashes,
    #[error("{boxes} recipient boxes for {keys} recipient keys")]
    RecipientCountMismatch { boxes: usize, keys: usize },
    #[error("{0} trailing bytes after payload end")]
    TrailingBytes(usize),
    #[error("recipient {0} is not in the payload")]
    RecipientNotInPayload(PublicKey),
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_seq<'a, I>(out: &mut Vec<u8>, items: I, count: usize)
where
    I: Iterator<Item = &'a [u8]>,
{
    out.extend_from_slice(&(count as u64).to_be_bytes());
    for item in items {
        put_field(out, item);
    }
}

/// Serialize a payload into its canonical wire form.
pub fn encode(payload: &EncodedPayload) -> Vec<u8> {
    let mut out = Vec::new();
    put_field(&mut out, payload.sender_key.as_bytes());
    put_field(&mut out, &payload.cipher_text);
    put_field(&mut out, &payload.cipher_text_nonce);
    put_seq(
        &mut out,
        payload.recipient_boxes.iter().map(Vec::as_slice),
        payload.recipient_boxes.len(),
    );
    put_field(&mut out, &payload.recipient_nonce);
    put_seq(
        &mut out,
        payload
            .recipient_keys
            .iter()
            .map(|key| key.as_bytes().as_slice()),
        payload.recipient_keys.len(),
    );
    out.push(payload.privacy_mode.as_flag());
    out.extend_from_slice(&(payload.affected_contract_transactions.len() as u64).to_be_bytes());
    for (tx_hash, security_hash) in &payload.affected_contract_transactions {
        put_field(&mut out, tx_hash.as_bytes());
        put_field(&mut out, security_hash);
    }
    put_field(&mut out, &payload.exec_hash);
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        if self.remaining() < 1 {
            return Err(CodecError::Truncated(field));
        }
        let value = self.buf[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        if self.remaining() < 8 {
            return Err(CodecError::Truncated(field));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_be_bytes(raw))
    }

    fn read_field(&mut self, field: &'static str) -> Result<&'a [u8], CodecError> {
        let declared = self.read_u64(field)?;
        let remaining = self.remaining();
        if declared > remaining as u64 {
            return Err(CodecError::LengthOutOfBounds { field, remaining });
        }
        let len = declared as usize;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Parse canonical wire bytes back into a payload. Strict: truncation,
/// out-of-bounds lengths, unknown privacy flags, malformed keys, non-ascending
/// affected hashes, and trailing bytes are all rejected.
pub fn decode(bytes: &[u8]) -> Result<EncodedPayload, CodecError> {
    let mut reader = Reader::new(bytes);

    let sender_key = PublicKey::try_from(reader.read_field("sender key")?)?;
    let cipher_text = reader.read_field("cipher text")?.to_vec();
    let cipher_text_nonce = reader.read_field("cipher text nonce")?.to_vec();

    let box_count = reader.read_u64("recipient box count")?;
    let mut recipient_boxes = Vec::new();
    for _ in 0..box_count {
        recipient_boxes.push(reader.read_field("recipient box")?.to_vec());
    }

    let recipient_nonce = reader.read_field("recipient nonce")?.to_vec();

    let key_count = reader.read_u64("recipient key count")?;
    let mut recipient_keys = Vec::new();
    for _ in 0..key_count {
        recipient_keys.push(PublicKey::try_from(reader.read_field("recipient key")?)?);
    }

    // Boxes and keys align by position whenever both are present; a payload
    // stored before key discovery may carry boxes with no keys.
    if !recipient_boxes.is_empty()
        && !recipient_keys.is_empty()
        && recipient_boxes.len() != recipient_keys.len()
    {
        return Err(CodecError::RecipientCountMismatch {
            boxes: recipient_boxes.len(),
            keys: recipient_keys.len(),
        });
    }

    let flag = reader.read_u8("privacy flag")?;
    let privacy_mode = PrivacyMode::from_flag(flag).ok_or(CodecError::UnknownPrivacyFlag(flag))?;

    let acoth_count = reader.read_u64("affected transaction count")?;
    let mut affected_contract_transactions = BTreeMap::new();
    let mut previous: Option<TxHash> = None;
    for _ in 0..acoth_count {
        let tx_hash = TxHash::new(reader.read_field("affected transaction hash")?.to_vec());
        let security_hash = reader.read_field("security hash")?.to_vec();
        if previous.as_ref().is_some_and(|last| *last >= tx_hash) {
            return Err(CodecError::UnorderedAffectedHashes);
        }
        previous = Some(tx_hash.clone());
        affected_contract_transactions.insert(tx_hash, security_hash);
    }

    let exec_hash = reader.read_field("exec hash")?.to_vec();

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }

    Ok(EncodedPayload {
        sender_key,
        cipher_text,
        cipher_text_nonce,
        recipient_boxes,
        recipient_nonce,
        recipient_keys,
        privacy_mode,
        affected_contract_transactions,
        exec_hash,
    })
}
