//! Backup audit logging
//!
//! Audit events go through `tracing` under the `audit` target, tagged with the
//! component and the ids of the objects involved.

use std::sync::Arc;

use tracing::{info, warn};

const COMPONENT: &str = "backup";

/// Backup audit logger with domain-specific methods
pub struct BackupAuditLogger {
    enabled: bool,
}

impl BackupAuditLogger {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create a noop audit logger (for testing)
    pub fn new_noop() -> Self {
        Self { enabled: false }
    }

    fn audit(&self, message: String, object_ids: Vec<String>) {
        if self.enabled {
            info!(target: "audit", component = COMPONENT, objects = ?object_ids, "{}", message);
        }
    }

    fn failure(&self, message: String, object_ids: Vec<String>) {
        if self.enabled {
            warn!(target: "audit", component = COMPONENT, objects = ?object_ids, "{}", message);
        }
    }

    // === Policy Events ===

    pub fn policy_added(&self, id: &str, policy_id: &str, name: &str, zone_id: Option<&str>) {
        self.audit(
            format!(
                "Backup policy '{}' added for provider policy '{}' in zone {}",
                name,
                policy_id,
                zone_id.unwrap_or("-")
            ),
            vec![id.to_string()],
        );
    }

    pub fn policy_deleted(&self, id: &str, name: &str) {
        self.audit(
            format!("Backup policy '{}' deleted", name),
            vec![id.to_string()],
        );
    }

    // === Assignment Events ===

    pub fn vm_assigned(&self, workload_id: &str, policy_id: &str, provider: &str) {
        self.audit(
            format!(
                "VM assigned to backup policy '{}' on provider '{}'",
                policy_id, provider
            ),
            vec![workload_id.to_string()],
        );
    }

    pub fn vm_assignment_rejected(&self, workload_id: &str, policy_id: &str, provider: &str) {
        self.failure(
            format!(
                "Provider '{}' rejected assignment to backup policy '{}'",
                provider, policy_id
            ),
            vec![workload_id.to_string()],
        );
    }
}

impl Default for BackupAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a shared backup audit logger
pub fn create_audit_logger() -> Arc<BackupAuditLogger> {
    Arc::new(BackupAuditLogger::new())
}
