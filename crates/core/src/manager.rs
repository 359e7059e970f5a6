//! The mediator. Every public operation passes through here: validation,
//! then enclave transforms, then persistence, then best-effort fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use confidant_crypto::{payload_hash, Enclave};
use confidant_storage::{RawTransactionStore, TransactionStore};
use confidant_types::{
    b64, wire, EncodedPayload, EncryptedRawTransaction, EncryptedTransaction, MessageHash,
    PrivacyMode, PublicKey, TxHash,
};

use crate::api::{
    self, DeleteRequest, ReceiveRequest, ReceiveResponse, ResendRequest, ResendResponse,
    ResendType, SendRequest, SendResponse, SendSignedRequest, StoreRawRequest, StoreRawResponse,
};
use crate::config::{ConfigError, MediatorConfig};
use crate::error::MediatorError;
use crate::peer::{OwnMessageSink, PayloadPublisher};
use crate::validation;

/// Thread-safe private-transaction mediator. Holds no mutable state; all
/// dependencies are shared and re-entrant, so operations may be invoked
/// concurrently from the hosting server.
pub struct TransactionManager {
    enclave: Arc<dyn Enclave>,
    transactions: Arc<dyn TransactionStore>,
    raw_transactions: Arc<dyn RawTransactionStore>,
    publisher: Arc<dyn PayloadPublisher>,
    own_messages: Arc<dyn OwnMessageSink>,
    resend_fetch_size: u64,
}

impl TransactionManager {
    pub fn new(
        enclave: Arc<dyn Enclave>,
        transactions: Arc<dyn TransactionStore>,
        raw_transactions: Arc<dyn RawTransactionStore>,
        publisher: Arc<dyn PayloadPublisher>,
        own_messages: Arc<dyn OwnMessageSink>,
        config: MediatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TransactionManager {
            enclave,
            transactions,
            raw_transactions,
            publisher,
            own_messages,
            resend_fetch_size: config.resend_fetch_size,
        })
    }

    /// Encrypt, persist, and fan out a new private transaction.
    pub fn send(&self, request: &SendRequest) -> Result<SendResponse, MediatorError> {
        let plaintext = api::decode_bytes(&request.payload, "payload")?;
        let sender = match &request.from {
            Some(encoded) => api::decode_public_key(encoded)?,
            None => self.enclave.default_public_key()?,
        };

        let recipients = self.assemble_recipients(&request.to, &sender)?;
        let privacy_mode = api::decode_privacy_flag(request.privacy_flag)?;
        let affected =
            self.resolve_outbound_affected(&request.affected_contract_transactions)?;
        self.validate_outbound(privacy_mode, &recipients, &affected)?;
        let exec_hash = outbound_exec_hash(privacy_mode, request.exec_hash.as_deref())?;

        let payload = self.enclave.encrypt_payload(
            &plaintext,
            &sender,
            &recipients,
            privacy_mode,
            &affected,
            &exec_hash,
        )?;
        let hash = payload_hash(&payload.cipher_text);

        self.persist_and_publish(&hash, &payload, &recipients)?;
        Ok(SendResponse {
            key: hash.to_base64(),
        })
    }

    /// Finalize a previously stored raw transaction and fan it out. The
    /// cipher-text (and so the content address) is the raw transaction's.
    pub fn send_signed_transaction(
        &self,
        request: &SendSignedRequest,
    ) -> Result<SendResponse, MediatorError> {
        let raw_hash = api::decode_message_hash(&request.hash)?;
        let raw = self
            .raw_transactions
            .retrieve(&raw_hash)?
            .ok_or(MediatorError::TransactionNotFound(raw_hash))?;

        let recipients = self.assemble_recipients(&request.to, &raw.sender)?;
        let privacy_mode = api::decode_privacy_flag(request.privacy_flag)?;
        let affected =
            self.resolve_outbound_affected(&request.affected_contract_transactions)?;
        self.validate_outbound(privacy_mode, &recipients, &affected)?;
        let exec_hash = outbound_exec_hash(privacy_mode, request.exec_hash.as_deref())?;

        let payload = self.enclave.encrypt_payload_from_raw(
            &raw,
            &recipients,
            privacy_mode,
            &affected,
            &exec_hash,
        )?;
        let hash = payload_hash(&payload.cipher_text);

        self.persist_and_publish(&hash, &payload, &recipients)?;
        Ok(SendResponse {
            key: hash.to_base64(),
        })
    }

    /// Accept an envelope forwarded by another node. Returns the payload's
    /// content address on every non-error path, including silent drops.
    pub fn store_payload(&self, encoded: &[u8]) -> Result<MessageHash, MediatorError> {
        let payload = wire::decode(encoded)?;
        let transaction_hash = payload_hash(&payload.cipher_text);

        // A reference we cannot resolve locally is omitted, not fatal: the
        // missing dependency may still arrive through backfill.
        let mut resolved = BTreeMap::new();
        for tx_hash in payload.affected_contract_transactions.keys() {
            match self.transactions.retrieve(&tx_hash.into())? {
                Some(record) => {
                    resolved.insert(tx_hash.clone(), wire::decode(&record.encoded_payload)?);
                }
                None => warn!(
                    transaction = %transaction_hash,
                    affected = %tx_hash,
                    "affected transaction not found locally, skipping"
                ),
            }
        }

        let mismatched = validation::privacy_mode_mismatches(payload.privacy_mode, &resolved);
        if !mismatched.is_empty() {
            warn!(
                transaction = %transaction_hash,
                affected = %mismatched[0],
                "privacy mode mismatch on inbound payload, discarding"
            );
            return Ok(transaction_hash);
        }

        if payload.privacy_mode == PrivacyMode::PrivateStateValidation {
            if !validation::sender_is_genuine(
                &payload.sender_key,
                payload.affected_contract_transactions.len(),
                &resolved,
            ) {
                warn!(
                    transaction = %transaction_hash,
                    sender = %payload.sender_key,
                    "sender not genuine, discarding payload"
                );
                return Ok(transaction_hash);
            }
            for (tx_hash, acoth) in &resolved {
                if !validation::recipients_match(&payload.recipient_keys, acoth) {
                    return Err(MediatorError::PrivacyViolation(format!(
                        "recipients of {transaction_hash} differ from affected transaction {tx_hash}"
                    )));
                }
            }
        }

        let invalid = self.enclave.find_invalid_security_hashes(&payload, &resolved);
        let sanitized = if invalid.is_empty() {
            encoded.to_vec()
        } else if payload.privacy_mode == PrivacyMode::PrivateStateValidation {
            return Err(MediatorError::PrivacyViolation(format!(
                "invalid security hash on {} affected transaction(s) of {transaction_hash}",
                invalid.len()
            )));
        } else {
            warn!(
                transaction = %transaction_hash,
                pruned = invalid.len(),
                "pruning affected entries with invalid security hashes"
            );
            wire::encode(&payload.clone().without_affected(&invalid))
        };

        if self.enclave.public_keys().contains(&payload.sender_key) {
            debug!(transaction = %transaction_hash, "own payload returned by a peer, reconciling");
            self.own_messages.accept_own_message(encoded)?;
        } else {
            self.transactions.save(&EncryptedTransaction {
                hash: transaction_hash.clone(),
                encoded_payload: sanitized,
            })?;
            info!(transaction = %transaction_hash, "stored inbound transaction");
        }
        Ok(transaction_hash)
    }

    /// Decrypt a stored payload. Without an explicit recipient key, managed
    /// keys are tried in order until one opens the envelope.
    pub fn receive(&self, request: &ReceiveRequest) -> Result<ReceiveResponse, MediatorError> {
        let hash = api::decode_message_hash(&request.key)?;
        let record = self
            .transactions
            .retrieve(&hash)?
            .ok_or_else(|| MediatorError::TransactionNotFound(hash.clone()))?;
        let payload = wire::decode(&record.encoded_payload)?;

        let plaintext = match &request.to {
            Some(encoded) => {
                let to = api::decode_public_key(encoded)?;
                self.enclave.unencrypt_transaction(&payload, &to)?
            }
            None => self
                .search_decrypt(&payload)
                .ok_or(MediatorError::NoRecipientKeyFound(hash))?
                .1,
        };

        Ok(ReceiveResponse {
            payload: b64::encode(&plaintext),
        })
    }

    /// Encrypt a payload for the sender only and park it until a signed send
    /// finalizes it.
    pub fn store(&self, request: &StoreRawRequest) -> Result<StoreRawResponse, MediatorError> {
        let plaintext = api::decode_bytes(&request.payload, "payload")?;
        let sender = match &request.from {
            Some(encoded) => api::decode_public_key(encoded)?,
            None => self.enclave.default_public_key()?,
        };

        let raw = self.enclave.encrypt_raw(&plaintext, &sender)?;
        let hash = payload_hash(&raw.encrypted_payload);
        self.raw_transactions.save(&EncryptedRawTransaction {
            hash: hash.clone(),
            encrypted_payload: raw.encrypted_payload,
            encrypted_key: raw.encrypted_key,
            nonce: raw.nonce,
            sender,
        })?;
        info!(transaction = %hash, "stored raw transaction");
        Ok(StoreRawResponse {
            key: hash.to_base64(),
        })
    }

    /// Remove a finalized transaction. Idempotent; deleting an absent hash is
    /// not an error.
    pub fn delete(&self, request: &DeleteRequest) -> Result<(), MediatorError> {
        let hash = api::decode_message_hash(&request.key)?;
        self.transactions.delete(&hash)?;
        info!(transaction = %hash, "deleted transaction");
        Ok(())
    }

    /// Backfill a peer (`ALL`) or hand a single payload back to the caller
    /// (`INDIVIDUAL`).
    pub fn resend(&self, request: &ResendRequest) -> Result<ResendResponse, MediatorError> {
        let peer = api::decode_public_key(&request.public_key)?;
        match request.resend_type {
            ResendType::All => {
                self.resend_all(&peer)?;
                Ok(ResendResponse { payload: None })
            }
            ResendType::Individual => {
                let key = request.key.as_ref().ok_or_else(|| {
                    MediatorError::InvalidRequest("key is required for INDIVIDUAL resend".into())
                })?;
                let encoded = self.resend_individual(&peer, key)?;
                Ok(ResendResponse {
                    payload: Some(b64::encode(&encoded)),
                })
            }
        }
    }

    fn resend_all(&self, peer: &PublicKey) -> Result<(), MediatorError> {
        let total = self.transactions.count()?;
        let mut offset = 0;
        info!(peer = %peer, total, batch = self.resend_fetch_size, "starting bulk resend");

        while offset < total {
            let page = self
                .transactions
                .retrieve_page(offset, self.resend_fetch_size)?;
            for record in page {
                let payload = wire::decode(&record.encoded_payload)?;
                if payload.sender_key == *peer {
                    // The peer authored this payload; restore the recipient
                    // key as seen from our side and send it back un-pruned.
                    let discovered = self
                        .search_decrypt(&payload)
                        .map(|(key, _)| key)
                        .ok_or_else(|| MediatorError::KeyNotFound(record.hash.clone()))?;
                    let restored = payload.with_recipient_key(discovered);
                    if let Err(err) = self.publisher.publish(&restored, peer) {
                        warn!(transaction = %record.hash, error = %err, "resend publish failed, continuing");
                    }
                } else if payload.recipient_keys.contains(peer) {
                    self.publish_best_effort(&record.hash, &payload, peer);
                }
            }
            offset += self.resend_fetch_size;
        }
        Ok(())
    }

    fn resend_individual(&self, peer: &PublicKey, key: &str) -> Result<Vec<u8>, MediatorError> {
        let hash = api::decode_message_hash(key)?;
        let record = self
            .transactions
            .retrieve(&hash)?
            .ok_or_else(|| MediatorError::TransactionNotFound(hash.clone()))?;
        let payload = wire::decode(&record.encoded_payload)?;

        let outbound = if payload.sender_key == *peer {
            let discovered = self
                .search_decrypt(&payload)
                .map(|(found, _)| found)
                .ok_or_else(|| {
                    MediatorError::Internal(anyhow::anyhow!(
                        "unable to recover the recipient key of payload {hash}"
                    ))
                })?;
            payload.with_recipient_key(discovered)
        } else if payload.privacy_mode == PrivacyMode::PrivateStateValidation
            && payload.recipient_keys.contains(peer)
        {
            payload
        } else {
            payload.for_recipient(peer)?
        };

        Ok(wire::encode(&outbound))
    }

    /// Recipient list for an outbound payload: the requested keys, then the
    /// sender, then the enclave's forwarding keys, first occurrence winning.
    fn assemble_recipients(
        &self,
        to: &[String],
        sender: &PublicKey,
    ) -> Result<Vec<PublicKey>, MediatorError> {
        let mut recipients = to
            .iter()
            .map(|encoded| api::decode_public_key(encoded))
            .collect::<Result<Vec<_>, _>>()?;
        recipients.push(*sender);
        recipients.extend(self.enclave.forwarding_keys());
        Ok(dedup_first_seen(recipients))
    }

    /// Outbound dependency lookup: every referenced transaction must exist
    /// locally, otherwise the send breaks the privacy contract.
    fn resolve_outbound_affected(
        &self,
        hashes: &[String],
    ) -> Result<BTreeMap<TxHash, EncodedPayload>, MediatorError> {
        let mut affected = BTreeMap::new();
        for encoded in hashes {
            let tx_hash = api::decode_tx_hash(encoded)?;
            let record = self.transactions.retrieve(&(&tx_hash).into())?.ok_or_else(|| {
                MediatorError::PrivacyViolation(format!(
                    "affected contract transaction {tx_hash} was not found"
                ))
            })?;
            affected.insert(tx_hash, wire::decode(&record.encoded_payload)?);
        }
        Ok(affected)
    }

    fn validate_outbound(
        &self,
        privacy_mode: PrivacyMode,
        recipients: &[PublicKey],
        affected: &BTreeMap<TxHash, EncodedPayload>,
    ) -> Result<(), MediatorError> {
        let mismatched = validation::privacy_mode_mismatches(privacy_mode, affected);
        if let Some(tx_hash) = mismatched.first() {
            return Err(MediatorError::PrivacyViolation(format!(
                "affected transaction {tx_hash} has a different privacy mode"
            )));
        }
        if privacy_mode == PrivacyMode::PrivateStateValidation {
            for (tx_hash, acoth) in affected {
                if !validation::recipients_match(recipients, acoth) {
                    return Err(MediatorError::PrivacyViolation(format!(
                        "recipients differ from affected transaction {tx_hash}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn persist_and_publish(
        &self,
        hash: &MessageHash,
        payload: &EncodedPayload,
        recipients: &[PublicKey],
    ) -> Result<(), MediatorError> {
        self.transactions.save(&EncryptedTransaction {
            hash: hash.clone(),
            encoded_payload: wire::encode(payload),
        })?;
        info!(transaction = %hash, recipients = recipients.len(), "stored outbound transaction");

        let managed = self.enclave.public_keys();
        for recipient in recipients {
            if managed.contains(recipient) {
                continue;
            }
            self.publish_best_effort(hash, payload, recipient);
        }
        Ok(())
    }

    /// Publish one envelope to one peer, never failing the operation. A
    /// payload under private-state validation travels whole, since recipients
    /// validate against the full recipient list; anything else is projected
    /// down to the target's own box first.
    fn publish_best_effort(
        &self,
        hash: &MessageHash,
        payload: &EncodedPayload,
        recipient: &PublicKey,
    ) {
        let outbound = if payload.privacy_mode == PrivacyMode::PrivateStateValidation {
            payload.clone()
        } else {
            match payload.for_recipient(recipient) {
                Ok(projected) => projected,
                Err(err) => {
                    warn!(transaction = %hash, recipient = %recipient, error = %err, "cannot project payload");
                    return;
                }
            }
        };
        if let Err(err) = self.publisher.publish(&outbound, recipient) {
            warn!(transaction = %hash, error = %err, "publish failed, peer will reconcile via resend");
        }
    }

    /// Trial decryption over the managed keys, in order. Decryption failures
    /// mean "wrong key" and are never surfaced from here.
    fn search_decrypt(&self, payload: &EncodedPayload) -> Option<(PublicKey, Vec<u8>)> {
        for key in self.enclave.public_keys() {
            match self.enclave.unencrypt_transaction(payload, &key) {
                Ok(plaintext) => return Some((key, plaintext)),
                Err(err) => {
                    debug!(key = %key, error = %err, "decryption attempt failed, trying next key")
                }
            }
        }
        None
    }
}

/// The execution hash is carried only under private-state validation, where
/// it is mandatory; outside it the field is always empty.
fn outbound_exec_hash(
    privacy_mode: PrivacyMode,
    exec_hash: Option<&str>,
) -> Result<Vec<u8>, MediatorError> {
    if privacy_mode != PrivacyMode::PrivateStateValidation {
        return Ok(Vec::new());
    }
    let decoded = exec_hash
        .map(|encoded| api::decode_bytes(encoded, "execHash"))
        .transpose()?
        .unwrap_or_default();
    if decoded.is_empty() {
        return Err(MediatorError::PrivacyViolation(
            "execHash is required for private state validation".into(),
        ));
    }
    Ok(decoded)
}

fn dedup_first_seen(keys: Vec<PublicKey>) -> Vec<PublicKey> {
    let mut seen = std::collections::BTreeSet::new();
    keys.into_iter().filter(|key| seen.insert(*key)).collect()
}
