use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::policy::BackupPolicy;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The (policy id, zone) pair is already tracked.
    #[error("backup policy '{policy_id}' is already registered in zone {zone_id:?}")]
    DuplicatePolicy {
        policy_id: String,
        zone_id: Option<String>,
    },

    #[error("invalid backup policy: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for imported backup policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a policy, assigning its internal id and creation time.
    async fn insert(&self, policy: &BackupPolicy) -> Result<BackupPolicy>;

    /// All policies, newest first.
    async fn list(&self) -> Result<Vec<BackupPolicy>>;

    /// Policies owned by a zone (`None` matches zone-less policies).
    async fn find_by_zone(&self, zone_id: Option<&str>) -> Result<Vec<BackupPolicy>>;

    async fn find_by_internal_id(&self, id: &str) -> Result<Option<BackupPolicy>>;

    async fn find_by_external_id(
        &self,
        policy_id: &str,
        zone_id: Option<&str>,
    ) -> Result<Option<BackupPolicy>>;

    /// Delete a policy. `false` if there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLite-backed policy store
pub struct SqliteStore {
    pool: SqlitePool,
}

const SELECT_POLICY: &str =
    "SELECT id, policy_id, name, zone_id, external, created_at FROM backup_policies";

impl SqliteStore {
    pub async fn new(metadata_dir: &str) -> Result<Self> {
        let db_path = format!("{}/backup.db", metadata_dir);
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::with_pool(pool).await
    }

    /// In-memory store. Single connection, every connection would get its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Close the connection pool. Later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_policy(row: &SqliteRow) -> BackupPolicy {
        BackupPolicy {
            id: Some(row.get("id")),
            policy_id: row.get("policy_id"),
            name: row.get("name"),
            zone_id: row.get("zone_id"),
            external: row.get::<i32, _>("external") != 0,
            created_at: Some(row.get("created_at")),
        }
    }
}

#[async_trait]
impl PolicyStore for SqliteStore {
    async fn insert(&self, policy: &BackupPolicy) -> Result<BackupPolicy> {
        if policy.policy_id.is_empty() {
            return Err(StoreError::InvalidRecord("policy id is required".into()));
        }
        if policy.name.is_empty() {
            return Err(StoreError::InvalidRecord("name is required".into()));
        }

        let entry = BackupPolicy {
            id: Some(Uuid::new_v4().to_string()),
            created_at: Some(Utc::now().to_rfc3339()),
            ..policy.clone()
        };

        let result = sqlx::query(
            r#"
            INSERT INTO backup_policies (id, policy_id, name, zone_id, external, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.policy_id)
        .bind(&entry.name)
        .bind(&entry.zone_id)
        .bind(entry.external)
        .bind(&entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(id = ?entry.id, policy_id = %entry.policy_id, "Stored backup policy");
                Ok(entry)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicatePolicy {
                    policy_id: entry.policy_id,
                    zone_id: entry.zone_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BackupPolicy>> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at DESC", SELECT_POLICY))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_policy).collect())
    }

    async fn find_by_zone(&self, zone_id: Option<&str>) -> Result<Vec<BackupPolicy>> {
        // `IS` compares NULL zones as equal.
        let rows = sqlx::query(&format!(
            "{} WHERE zone_id IS ? ORDER BY created_at DESC",
            SELECT_POLICY
        ))
        .bind(zone_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_policy).collect())
    }

    async fn find_by_internal_id(&self, id: &str) -> Result<Option<BackupPolicy>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_POLICY))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_policy))
    }

    async fn find_by_external_id(
        &self,
        policy_id: &str,
        zone_id: Option<&str>,
    ) -> Result<Option<BackupPolicy>> {
        let row = sqlx::query(&format!(
            "{} WHERE policy_id = ? AND zone_id IS ?",
            SELECT_POLICY
        ))
        .bind(policy_id)
        .bind(zone_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_policy))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup_policies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
