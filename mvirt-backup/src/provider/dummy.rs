//! In-memory provider for development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{BackupProvider, Result};
use crate::policy::BackupPolicy;

pub const DUMMY_PROVIDER_NAME: &str = "dummy";

/// Provider backed by a fixed policy catalogue.
///
/// Assignments are kept in memory, one policy per workload.
pub struct DummyProvider {
    name: String,
    description: String,
    policies: Vec<(String, String)>,
    assignments: Mutex<HashMap<String, String>>,
}

impl DummyProvider {
    /// Dummy provider with the default catalogue.
    pub fn new() -> Self {
        Self::with_policies(
            DUMMY_PROVIDER_NAME,
            vec![
                ("gold-daily".to_string(), "Gold - daily".to_string()),
                ("silver-weekly".to_string(), "Silver - weekly".to_string()),
            ],
        )
    }

    /// Dummy provider with a custom name and `(policy_id, name)` catalogue.
    pub fn with_policies(name: &str, policies: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            description: "Dummy backup provider (in-memory)".to_string(),
            policies,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    /// Policy a workload is currently bound to.
    pub fn assigned_policy(&self, workload_id: &str) -> Option<String> {
        self.assignments
            .lock()
            .ok()
            .and_then(|a| a.get(workload_id).cloned())
    }
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackupProvider for DummyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn list_policies(&self) -> Result<Vec<BackupPolicy>> {
        Ok(self
            .policies
            .iter()
            .map(|(id, name)| BackupPolicy::external(id.as_str(), name.as_str()))
            .collect())
    }

    async fn is_policy(&self, policy_id: &str) -> Result<bool> {
        Ok(self.policies.iter().any(|(id, _)| id == policy_id))
    }

    async fn assign_workload_to_policy(&self, workload_id: &str, policy_id: &str) -> Result<bool> {
        if workload_id.is_empty() || !self.is_policy(policy_id).await? {
            debug!(workload_id, policy_id, "Dummy provider rejected assignment");
            return Ok(false);
        }

        let mut assignments = self
            .assignments
            .lock()
            .map_err(|_| super::ProviderError::Unavailable("assignment table poisoned".into()))?;
        assignments.insert(workload_id.to_string(), policy_id.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_catalogue() {
        let provider = DummyProvider::new();
        assert_eq!(provider.name(), "dummy");
        assert!(!provider.description().is_empty());

        let policies = provider.list_policies().await.unwrap();
        assert_eq!(policies.len(), 2);
        assert!(policies.iter().all(|p| p.external && p.id.is_none()));

        assert!(provider.is_policy("gold-daily").await.unwrap());
        assert!(!provider.is_policy("platinum").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_catalogue_is_not_an_error() {
        let provider = DummyProvider::with_policies("empty", vec![]);
        assert!(provider.list_policies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assignment_supersedes_previous() {
        let provider = DummyProvider::new();

        assert!(
            provider
                .assign_workload_to_policy("vm-1", "gold-daily")
                .await
                .unwrap()
        );
        assert!(
            provider
                .assign_workload_to_policy("vm-1", "silver-weekly")
                .await
                .unwrap()
        );
        assert_eq!(
            provider.assigned_policy("vm-1").as_deref(),
            Some("silver-weekly")
        );
    }

    #[tokio::test]
    async fn test_assignment_rejected() {
        let provider = DummyProvider::new();

        assert!(
            !provider
                .assign_workload_to_policy("vm-1", "platinum")
                .await
                .unwrap()
        );
        assert!(
            !provider
                .assign_workload_to_policy("", "gold-daily")
                .await
                .unwrap()
        );
        assert_eq!(provider.assigned_policy("vm-1"), None);
    }
}
