//! Backup provider contract.
//!
//! A provider is one backup/recovery backend. The manager only ever reaches a
//! provider through the registry, so implementations can be swapped freely.

use async_trait::async_trait;
use thiserror::Error;

use crate::policy::BackupPolicy;

pub mod dummy;
pub mod http;

pub use dummy::DummyProvider;
pub use http::HttpProvider;

/// Errors raised by provider implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider endpoint could not be reached.
    #[error("backup provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we could not make sense of.
    #[error("backup provider protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Capability set every backup/recovery integration exposes.
#[async_trait]
pub trait BackupProvider: Send + Sync {
    /// Stable, non-empty provider name. Zones reference providers by this name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// All policies currently defined on the provider, marked external.
    ///
    /// An empty provider returns an empty list, not an error.
    async fn list_policies(&self) -> Result<Vec<BackupPolicy>>;

    /// Whether a policy with this id exists on the provider.
    async fn is_policy(&self, policy_id: &str) -> Result<bool>;

    /// Bind a workload to a policy.
    ///
    /// Returns `Ok(false)` when the provider rejects the binding (unknown workload,
    /// unknown policy). Errors mean the provider could not be asked.
    async fn assign_workload_to_policy(&self, workload_id: &str, policy_id: &str) -> Result<bool>;
}
