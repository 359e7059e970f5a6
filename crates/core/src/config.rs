use serde::{Deserialize, Serialize};

/// Batch size used when paging through the store during a bulk resend.
pub const DEFAULT_RESEND_FETCH_SIZE: u64 = 100;

/// Options recognized by the mediator core. Everything else in a node
/// configuration belongs to external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediatorConfig {
    #[serde(default = "default_resend_fetch_size")]
    pub resend_fetch_size: u64,
}

fn default_resend_fetch_size() -> u64 {
    DEFAULT_RESEND_FETCH_SIZE
}

impl Default for MediatorConfig {
    fn default() -> Self {
        MediatorConfig {
            resend_fetch_size: DEFAULT_RESEND_FETCH_SIZE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("resendFetchSize must be at least 1")]
    InvalidResendFetchSize,
}

impl MediatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resend_fetch_size < 1 {
            return Err(ConfigError::InvalidResendFetchSize);
        }
        Ok(())
    }
}
