use confidant_types::{EncodedPayload, PublicKey};

/// Failure to deliver one envelope to one peer key. The mediator logs these
/// and keeps going; the local store remains the record of truth and peers
/// reconcile through their own resend.
#[derive(Debug, thiserror::Error)]
#[error("publish to {recipient} failed: {reason}")]
pub struct PublishError {
    pub recipient: PublicKey,
    pub reason: String,
}

/// Outbound fan-out sink: delivers one envelope to the peer owning a key.
pub trait PayloadPublisher: Send + Sync {
    fn publish(&self, payload: &EncodedPayload, recipient: &PublicKey) -> Result<(), PublishError>;
}

/// Sink for inbound copies of payloads this node itself originated. The sink
/// owns the decision whether and how to reconcile them with local state.
pub trait OwnMessageSink: Send + Sync {
    fn accept_own_message(&self, encoded: &[u8]) -> anyhow::Result<()>;
}
