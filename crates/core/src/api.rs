//! Boundary shapes of the mediator's public operations. Byte fields travel
//! base64-encoded; conversion to domain types happens here, at the edge.

use serde::{Deserialize, Serialize};

use confidant_types::{b64, MessageHash, PrivacyMode, PublicKey, TxHash};

use crate::error::MediatorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Base64 plaintext to protect.
    pub payload: String,
    /// Sending identity; the enclave default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub privacy_flag: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_hash: Option<String>,
    /// Hashes of prior transactions the new one depends on.
    #[serde(default)]
    pub affected_contract_transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSignedRequest {
    /// Hash of a previously stored raw transaction.
    pub hash: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub privacy_flag: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_hash: Option<String>,
    #[serde(default)]
    pub affected_contract_transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveResponse {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRawRequest {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRawResponse {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResendType {
    /// Bulk backfill: publish every payload the key participates in.
    All,
    /// Return a single payload to the caller without publishing.
    Individual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[serde(rename = "type")]
    pub resend_type: ResendType,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

pub(crate) fn decode_public_key(encoded: &str) -> Result<PublicKey, MediatorError> {
    PublicKey::from_base64(encoded)
        .map_err(|err| MediatorError::InvalidRequest(format!("public key: {err}")))
}

pub(crate) fn decode_message_hash(encoded: &str) -> Result<MessageHash, MediatorError> {
    MessageHash::from_base64(encoded)
        .map_err(|err| MediatorError::InvalidRequest(format!("transaction hash: {err}")))
}

pub(crate) fn decode_tx_hash(encoded: &str) -> Result<TxHash, MediatorError> {
    TxHash::from_base64(encoded)
        .map_err(|err| MediatorError::InvalidRequest(format!("affected transaction hash: {err}")))
}

pub(crate) fn decode_bytes(encoded: &str, field: &str) -> Result<Vec<u8>, MediatorError> {
    b64::decode(encoded).map_err(|err| MediatorError::InvalidRequest(format!("{field}: {err}")))
}

pub(crate) fn decode_privacy_flag(flag: u8) -> Result<PrivacyMode, MediatorError> {
    PrivacyMode::from_flag(flag)
        .ok_or_else(|| MediatorError::InvalidRequest(format!("unknown privacy flag {flag}")))
}
