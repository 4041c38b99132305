// src/error.rs

use crate::config::ConfigError;
use crate::storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage deadline exceeded")]
    Timeout,
    #[error("unknown action {0:?}")]
    InvalidAction(String),
    #[error("unknown reason {0:?}")]
    InvalidReason(String),
    #[error("invalid ip address {0:?}")]
    InvalidIp(String),
}

impl KernelError {
    /// Storage-side failures resolve through the configured fail mode;
    /// everything else is the caller's mistake.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, KernelError::Store(_) | KernelError::Timeout)
    }
}
