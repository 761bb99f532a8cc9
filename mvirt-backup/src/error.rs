//! Backup manager error types.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Errors returned by the backup manager.
///
/// Provider, registry and store errors are translated into these two kinds;
/// the original message is kept.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The caller supplied bad or unverifiable input, or a zone without a provider.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Store or provider failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Whether the error is the caller's fault (4xx-style) rather than ours (5xx-style).
    pub fn is_client_error(&self) -> bool {
        matches!(self, BackupError::InvalidParameter(_))
    }
}

impl From<RegistryError> for BackupError {
    fn from(e: RegistryError) -> Self {
        BackupError::InvalidParameter(e.to_string())
    }
}

impl From<ProviderError> for BackupError {
    fn from(e: ProviderError) -> Self {
        BackupError::Internal(e.to_string())
    }
}

impl From<StoreError> for BackupError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicatePolicy { .. } | StoreError::InvalidRecord(_) => {
                BackupError::InvalidParameter(e.to_string())
            }
            StoreError::Database(_) | StoreError::Migration(_) => {
                BackupError::Internal(e.to_string())
            }
        }
    }
}

/// Result type for backup manager operations.
pub type Result<T> = std::result::Result<T, BackupError>;
