//! Backup policy entity and its response shape.

use serde::{Deserialize, Serialize};

/// A backup policy, either imported into local tracking or discovered on a provider.
///
/// Imported policies carry an internal `id` and `created_at`. Policies returned by a
/// provider listing are `external` and have neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    /// Internal id (UUID), only present for imported policies.
    pub id: Option<String>,
    /// Policy id on the provider side.
    pub policy_id: String,
    pub name: String,
    /// Owning zone; `None` when registered without a zone.
    pub zone_id: Option<String>,
    pub external: bool,
    pub created_at: Option<String>,
}

impl BackupPolicy {
    /// A policy as seen on the provider, not (yet) tracked locally.
    pub fn external(policy_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            policy_id: policy_id.into(),
            name: name.into(),
            zone_id: None,
            external: true,
            created_at: None,
        }
    }

    /// A policy about to be imported. The store assigns `id` and `created_at`.
    pub fn imported(policy_id: String, name: String, zone_id: Option<String>) -> Self {
        Self {
            id: None,
            policy_id,
            name,
            zone_id,
            external: false,
            created_at: None,
        }
    }

    pub fn with_zone(mut self, zone_id: Option<String>) -> Self {
        self.zone_id = zone_id;
        self
    }
}

/// Response object for a backup policy.
///
/// `id` is omitted for external policies: they are only addressable by `policy_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub policy_id: String,
}

impl From<&BackupPolicy> for PolicyResponse {
    fn from(policy: &BackupPolicy) -> Self {
        Self {
            id: if policy.external {
                None
            } else {
                policy.id.clone()
            },
            name: policy.name.clone(),
            policy_id: policy.policy_id.clone(),
        }
    }
}
