//! mvirt-backup: backup policy management for mvirt
//!
//! Registers policies of pluggable backup providers, assigns VMs to them and
//! compares the provider's policies with the locally tracked ones.

pub mod audit;
pub mod config;
pub mod error;
pub mod manager;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod store;

pub use audit::{BackupAuditLogger, create_audit_logger};
pub use config::BackupConfig;
pub use error::BackupError;
pub use manager::{BackupManager, ReconcileReport};
pub use policy::{BackupPolicy, PolicyResponse};
pub use provider::{BackupProvider, ProviderError};
pub use registry::{ProviderRegistry, RegistryError, ZoneSettings};
pub use store::{PolicyStore, SqliteStore, StoreError};
