//! Confidant mediator core. Encrypts, stores, distributes, retrieves, and
//! validates private payloads for a consortium network: the public chain only
//! ever sees a content-addressed digest, while envelopes travel off-chain to
//! the keys entitled to them. Enforces the private-state-validation rules
//! binding a new transaction to the prior transactions it depends on.

pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod peer;
pub mod validation;

pub use api::{
    DeleteRequest, ReceiveRequest, ReceiveResponse, ResendRequest, ResendResponse, ResendType,
    SendRequest, SendResponse, SendSignedRequest, StoreRawRequest, StoreRawResponse,
};
pub use config::{ConfigError, MediatorConfig, DEFAULT_RESEND_FETCH_SIZE};
pub use error::MediatorError;
pub use manager::TransactionManager;
pub use peer::{OwnMessageSink, PayloadPublisher, PublishError};
