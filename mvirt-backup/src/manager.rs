//! Backup manager.
//!
//! The only entry point for callers. Every provider call goes through the registry
//! for the requested zone; the store is only written after the provider agreed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::BackupAuditLogger;
use crate::error::{BackupError, Result};
use crate::policy::{BackupPolicy, PolicyResponse};
use crate::registry::ProviderRegistry;
use crate::store::PolicyStore;

/// Comparison of a zone's imported policies with what its provider lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Imported policies the provider still has.
    pub imported: Vec<PolicyResponse>,
    /// Imported policies the provider no longer lists.
    pub missing_on_provider: Vec<PolicyResponse>,
    /// Provider policies that were never imported.
    pub not_imported: Vec<PolicyResponse>,
}

impl ReconcileReport {
    pub fn has_drift(&self) -> bool {
        !self.missing_on_provider.is_empty()
    }
}

pub struct BackupManager {
    store: Arc<dyn PolicyStore>,
    registry: Arc<ProviderRegistry>,
    audit: Arc<BackupAuditLogger>,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        registry: Arc<ProviderRegistry>,
        audit: Arc<BackupAuditLogger>,
    ) -> Self {
        Self {
            store,
            registry,
            audit,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Response object for a policy.
    pub fn create_backup_policy_response(&self, policy: &BackupPolicy) -> PolicyResponse {
        PolicyResponse::from(policy)
    }

    /// Import a provider policy into local tracking.
    ///
    /// Without a zone, the single active provider is used and the record is
    /// stored with no zone. Such a record is tracked apart from records for the
    /// zones that provider serves: importing the same policy id for one of those
    /// zones later creates a second record, and `reconcile_policies` only sees it
    /// when called without a zone.
    pub async fn add_backup_policy(
        &self,
        policy_id: &str,
        name: &str,
        zone_id: Option<&str>,
    ) -> Result<BackupPolicy> {
        if policy_id.is_empty() {
            return Err(BackupError::InvalidParameter(
                "policy id is required".into(),
            ));
        }
        if name.is_empty() {
            return Err(BackupError::InvalidParameter("name is required".into()));
        }

        let provider = self.registry.resolve(zone_id)?;

        if !provider.is_policy(policy_id).await? {
            return Err(BackupError::InvalidParameter(format!(
                "policy '{}' does not exist on backup provider '{}'",
                policy_id,
                provider.name()
            )));
        }

        let policy = self
            .store
            .insert(&BackupPolicy::imported(
                policy_id.to_string(),
                name.to_string(),
                zone_id.map(str::to_string),
            ))
            .await?;

        let id = policy.id.as_deref().unwrap_or_default();
        info!(id = %id, policy_id = %policy_id, zone = ?zone_id, "Backup policy added");
        self.audit.policy_added(id, policy_id, name, zone_id);

        Ok(policy)
    }

    /// Bind a VM to a provider policy. Returns the provider's answer as-is.
    pub async fn assign_vm_to_backup_policy(
        &self,
        policy_id: &str,
        workload_id: &str,
        zone_id: Option<&str>,
    ) -> Result<bool> {
        let provider = self.registry.resolve(zone_id)?;

        let assigned = provider
            .assign_workload_to_policy(workload_id, policy_id)
            .await
            .inspect_err(|e| {
                warn!(
                    provider = %provider.name(),
                    workload_id = %workload_id,
                    policy_id = %policy_id,
                    error = %e,
                    "Backup provider failed to assign VM"
                )
            })?;

        if assigned {
            info!(
                workload_id = %workload_id,
                policy_id = %policy_id,
                "VM assigned to backup policy"
            );
            self.audit
                .vm_assigned(workload_id, policy_id, provider.name());
        } else {
            self.audit
                .vm_assignment_rejected(workload_id, policy_id, provider.name());
        }

        Ok(assigned)
    }

    /// Policies imported into local tracking, across all zones.
    pub async fn list_backup_policies(&self) -> Result<Vec<BackupPolicy>> {
        let policies = self.store.list().await?;
        Ok(policies.into_iter().filter(|p| !p.external).collect())
    }

    /// Policies defined on the zone's provider. Not merged with local records.
    pub async fn list_backup_provider_policies(
        &self,
        zone_id: Option<&str>,
    ) -> Result<Vec<BackupPolicy>> {
        let provider = self.registry.resolve(zone_id)?;
        let policies = provider.list_policies().await?;

        Ok(policies
            .into_iter()
            .map(|p| {
                BackupPolicy {
                    id: None,
                    external: true,
                    created_at: None,
                    ..p
                }
                .with_zone(zone_id.map(str::to_string))
            })
            .collect())
    }

    /// Stop tracking a policy. The provider side is left untouched.
    pub async fn delete_backup_policy(&self, id: &str) -> Result<bool> {
        let Some(policy) = self.store.find_by_internal_id(id).await? else {
            return Ok(false);
        };

        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(id = %id, policy_id = %policy.policy_id, "Backup policy deleted");
            self.audit.policy_deleted(id, &policy.name);
        }
        Ok(deleted)
    }

    /// Compare the zone's imported policies with the provider's list. Read-only.
    pub async fn reconcile_policies(&self, zone_id: Option<&str>) -> Result<ReconcileReport> {
        let provider = self.registry.resolve(zone_id)?;
        let remote = provider.list_policies().await?;
        let local = self.store.find_by_zone(zone_id).await?;

        let remote_ids: HashSet<&str> = remote.iter().map(|p| p.policy_id.as_str()).collect();
        let local_ids: HashSet<&str> = local.iter().map(|p| p.policy_id.as_str()).collect();

        let mut report = ReconcileReport::default();
        for policy in &local {
            let response = PolicyResponse::from(policy);
            if remote_ids.contains(policy.policy_id.as_str()) {
                report.imported.push(response);
            } else {
                report.missing_on_provider.push(response);
            }
        }
        report.not_imported = remote
            .iter()
            .filter(|p| !local_ids.contains(p.policy_id.as_str()))
            .map(|p| PolicyResponse {
                id: None,
                name: p.name.clone(),
                policy_id: p.policy_id.clone(),
            })
            .collect();

        if report.has_drift() {
            warn!(
                zone = ?zone_id,
                provider = %provider.name(),
                missing = report.missing_on_provider.len(),
                "Imported backup policies missing on provider"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use crate::provider::{self, BackupProvider, DummyProvider, ProviderError};
    use crate::registry::ZoneSettings;
    use crate::store::SqliteStore;

    /// Provider that cannot be reached.
    struct OfflineProvider;

    #[async_trait]
    impl BackupProvider for OfflineProvider {
        fn name(&self) -> &str {
            "offline"
        }

        fn description(&self) -> &str {
            "always unavailable"
        }

        async fn list_policies(&self) -> provider::Result<Vec<BackupPolicy>> {
            Err(ProviderError::Unavailable("connection refused".into()))
        }

        async fn is_policy(&self, _policy_id: &str) -> provider::Result<bool> {
            Err(ProviderError::Unavailable("connection refused".into()))
        }

        async fn assign_workload_to_policy(
            &self,
            _workload_id: &str,
            _policy_id: &str,
        ) -> provider::Result<bool> {
            Err(ProviderError::Unavailable("connection refused".into()))
        }
    }

    /// Provider whose answers cannot be decoded.
    struct GarbledProvider;

    #[async_trait]
    impl BackupProvider for GarbledProvider {
        fn name(&self) -> &str {
            "garbled"
        }

        fn description(&self) -> &str {
            "returns malformed responses"
        }

        async fn list_policies(&self) -> provider::Result<Vec<BackupPolicy>> {
            Err(ProviderError::Protocol("bad json".into()))
        }

        async fn is_policy(&self, _policy_id: &str) -> provider::Result<bool> {
            Err(ProviderError::Protocol("bad json".into()))
        }

        async fn assign_workload_to_policy(
            &self,
            _workload_id: &str,
            _policy_id: &str,
        ) -> provider::Result<bool> {
            Err(ProviderError::Protocol("bad json".into()))
        }
    }

    async fn setup() -> (BackupManager, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(Arc::new(DummyProvider::with_policies(
            "dummy",
            vec![
                ("biz-daily".to_string(), "Daily".to_string()),
                ("biz-weekly".to_string(), "Weekly".to_string()),
            ],
        )));
        registry.register(Arc::new(OfflineProvider));
        registry.register(Arc::new(GarbledProvider));

        let mut zones = BTreeMap::new();
        zones.insert("z1".to_string(), ZoneSettings::enabled("dummy"));
        zones.insert("z-offline".to_string(), ZoneSettings::enabled("offline"));
        zones.insert("z-garbled".to_string(), ZoneSettings::enabled("garbled"));
        zones.insert("z-off".to_string(), ZoneSettings::default());
        registry.reload_zones(zones);

        let manager = BackupManager::new(
            store.clone(),
            registry,
            Arc::new(BackupAuditLogger::new_noop()),
        );
        (manager, store)
    }

    #[tokio::test]
    async fn test_add_requires_name_and_policy_id() {
        let (manager, _) = setup().await;

        for (policy_id, name) in [("", "Daily"), ("biz-daily", "")] {
            let err = manager
                .add_backup_policy(policy_id, name, Some("z1"))
                .await
                .unwrap_err();
            assert!(matches!(err, BackupError::InvalidParameter(_)));
        }
        assert!(manager.list_backup_policies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_with_offline_provider_is_internal() {
        let (manager, _) = setup().await;

        let err = manager
            .add_backup_policy("biz-daily", "Daily", Some("z-offline"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
        assert!(err.to_string().contains("connection refused"));
        assert!(manager.list_backup_policies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_provider_answers_are_internal() {
        let (manager, store) = setup().await;
        let zone = Some("z-garbled");

        let err = manager
            .add_backup_policy("biz-daily", "Daily", zone)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
        assert!(err.to_string().contains("bad json"));

        let err = manager
            .list_backup_provider_policies(zone)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
        assert!(err.to_string().contains("bad json"));

        let err = manager
            .assign_vm_to_backup_policy("biz-daily", "vm-1", zone)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
        assert!(err.to_string().contains("bad json"));

        let err = manager.reconcile_policies(zone).await.unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
        assert!(err.to_string().contains("bad json"));

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_without_zone_uses_single_provider() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(Arc::new(DummyProvider::new()));
        let mut zones = BTreeMap::new();
        zones.insert("z1".to_string(), ZoneSettings::enabled("dummy"));
        registry.reload_zones(zones);
        let manager = BackupManager::new(store, registry, Arc::new(BackupAuditLogger::new_noop()));

        let policy = manager
            .add_backup_policy("gold-daily", "Gold", None)
            .await
            .unwrap();
        assert_eq!(policy.zone_id, None);
        assert!(policy.id.is_some());

        // The zone-less record does not cover z1, even though the same provider serves it.
        let zoned = manager
            .add_backup_policy("gold-daily", "Gold", Some("z1"))
            .await
            .unwrap();
        assert_eq!(zoned.zone_id.as_deref(), Some("z1"));
        assert_ne!(zoned.id, policy.id);
        assert_eq!(manager.list_backup_policies().await.unwrap().len(), 2);

        let err = manager
            .add_backup_policy("gold-daily", "Gold again", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_add_without_zone_is_ambiguous() {
        let (manager, _) = setup().await;

        let err = manager
            .add_backup_policy("biz-daily", "Daily", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_delete_leaves_other_records() {
        let (manager, store) = setup().await;

        let daily = manager
            .add_backup_policy("biz-daily", "Daily", Some("z1"))
            .await
            .unwrap();
        manager
            .add_backup_policy("biz-weekly", "Weekly", Some("z1"))
            .await
            .unwrap();

        assert!(
            manager
                .delete_backup_policy(daily.id.as_deref().unwrap())
                .await
                .unwrap()
        );
        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].policy_id, "biz-weekly");
    }

    #[tokio::test]
    async fn test_reimport_after_delete_gets_new_id() {
        let (manager, _) = setup().await;

        let first = manager
            .add_backup_policy("biz-daily", "Daily", Some("z1"))
            .await
            .unwrap();
        manager
            .delete_backup_policy(first.id.as_deref().unwrap())
            .await
            .unwrap();
        let second = manager
            .add_backup_policy("biz-daily", "Daily", Some("z1"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_list_fails_when_store_is_down() {
        let (manager, store) = setup().await;
        store.close().await;

        let err = manager.list_backup_policies().await.unwrap_err();
        assert!(matches!(err, BackupError::Internal(_)));
    }

    #[tokio::test]
    async fn test_reconcile_reports_drift() {
        let (manager, store) = setup().await;

        manager
            .add_backup_policy("biz-daily", "Daily", Some("z1"))
            .await
            .unwrap();
        // Simulate a policy that disappeared on the provider after import.
        store
            .insert(&BackupPolicy::imported(
                "biz-retired".to_string(),
                "Retired".to_string(),
                Some("z1".to_string()),
            ))
            .await
            .unwrap();

        let report = manager.reconcile_policies(Some("z1")).await.unwrap();
        assert!(report.has_drift());
        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.imported[0].policy_id, "biz-daily");
        assert_eq!(report.missing_on_provider.len(), 1);
        assert_eq!(report.missing_on_provider[0].policy_id, "biz-retired");
        assert_eq!(report.not_imported.len(), 1);
        assert_eq!(report.not_imported[0].policy_id, "biz-weekly");
        assert!(report.not_imported[0].id.is_none());

        // Reconciliation does not touch the store.
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_zone_rejects_provider_calls() {
        let (manager, _) = setup().await;

        let err = manager.reconcile_policies(Some("z-off")).await.unwrap_err();
        assert!(matches!(err, BackupError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_response_shape() {
        let (manager, _) = setup().await;

        let policy = manager
            .add_backup_policy("biz-daily", "Daily", Some("z1"))
            .await
            .unwrap();
        let response = manager.create_backup_policy_response(&policy);
        assert_eq!(response.id, policy.id);
        assert_eq!(response.name, "Daily");
        assert_eq!(response.policy_id, "biz-daily");
    }
}
