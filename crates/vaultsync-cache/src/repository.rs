//! SQLite implementation of IPrevSyncStore and IPlanStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                   |
//! |-----------------|----------|--------------------------------------------|
//! | Entity          | TEXT     | serde_json serialization                   |
//! | base content    | BLOB     | raw bytes, `NULL` when not stored          |
//! | SyncPlan        | TEXT     | serde_json, meta entry under `/$@meta`     |
//! | Uuid            | TEXT     | `.to_string()` / `Uuid::parse_str()`       |
//! | TriggerSource   | TEXT     | `.as_str()` / `FromStr`                    |
//! | DateTime<Utc>   | TEXT     | ISO 8601 via `to_rfc3339()`                |

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use vaultsync_core::domain::{Entity, SyncPlan, TriggerSource};
use vaultsync_core::ports::{IPlanStore, IPrevSyncStore};

use crate::CacheError;

/// Plans kept per vault and profile unless configured otherwise
pub const DEFAULT_PLAN_RETENTION: usize = 20;

/// Summary row of a stored plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRecord {
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub changes: usize,
}

/// SQLite-backed state store
///
/// One database holds the records of every vault and profile; every
/// query is scoped by the pair.
pub struct SqliteStateStore {
    pool: SqlitePool,
    plan_retention: usize,
}

impl SqliteStateStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            plan_retention: DEFAULT_PLAN_RETENTION,
        }
    }

    /// Keep at most `retention` plans per vault and profile (minimum 1)
    #[must_use]
    pub fn with_plan_retention(mut self, retention: usize) -> Self {
        self.plan_retention = retention.max(1);
        self
    }

    /// Stored plans, newest first
    pub async fn recent_plans(
        &self,
        vault: &str,
        profile: &str,
        limit: usize,
    ) -> Result<Vec<PlanRecord>, CacheError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT run_id, trigger_source, generated_at, total, changes FROM sync_plans \
             WHERE vault = ? AND profile = ? ORDER BY rowid DESC LIMIT ?",
        )
        .bind(vault)
        .bind(profile)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(plan_record_from_row).collect()
    }

    /// Drop every previous-sync record of a vault and profile
    ///
    /// The next run then treats both replicas as if seen for the first
    /// time.
    pub async fn forget(&self, vault: &str, profile: &str) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM prev_sync WHERE vault = ? AND profile = ?")
            .bind(vault)
            .bind(profile)
            .execute(&self.pool)
            .await?;
        tracing::info!(
            vault,
            profile,
            removed = result.rows_affected(),
            "Previous sync records cleared"
        );
        Ok(result.rows_affected())
    }

    /// Number of previous-sync records of a vault and profile
    pub async fn count_records(&self, vault: &str, profile: &str) -> Result<u64, CacheError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM prev_sync WHERE vault = ? AND profile = ?")
                .bind(vault)
                .bind(profile)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn prune_plans(&self, vault: &str, profile: &str) -> Result<(), CacheError> {
        let keep = i64::try_from(self.plan_retention).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM sync_plans WHERE vault = ? AND profile = ? AND rowid NOT IN \
             (SELECT rowid FROM sync_plans WHERE vault = ? AND profile = ? \
              ORDER BY rowid DESC LIMIT ?)",
        )
        .bind(vault)
        .bind(profile)
        .bind(vault)
        .bind(profile)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(pruned = result.rows_affected(), "Old plans pruned");
        }
        Ok(())
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn entity_from_row(row: &SqliteRow) -> Result<Entity, CacheError> {
    let json: String = row.get("entity");
    Ok(serde_json::from_str(&json)?)
}

fn plan_record_from_row(row: &SqliteRow) -> Result<PlanRecord, CacheError> {
    let run_id_str: String = row.get("run_id");
    let trigger_str: String = row.get("trigger_source");
    let generated_at_str: String = row.get("generated_at");
    let total: i64 = row.get("total");
    let changes: i64 = row.get("changes");

    let run_id = Uuid::parse_str(&run_id_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid run id: {e}")))?;
    let trigger = trigger_str
        .parse::<TriggerSource>()
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let generated_at = DateTime::parse_from_rfc3339(&generated_at_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid timestamp: {e}")))?
        .with_timezone(&Utc);

    Ok(PlanRecord {
        run_id,
        trigger,
        generated_at,
        total: usize::try_from(total).unwrap_or(0),
        changes: usize::try_from(changes).unwrap_or(0),
    })
}

// ============================================================================
// IPrevSyncStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IPrevSyncStore for SqliteStateStore {
    async fn upsert(&self, vault: &str, profile: &str, entity: &Entity) -> anyhow::Result<()> {
        let json = serde_json::to_string(entity)
            .map_err(|e| anyhow::anyhow!("Failed to serialize entity: {}", e))?;
        let now = Utc::now().to_rfc3339();

        // Keep stored content; only the record itself is replaced
        sqlx::query(
            "INSERT INTO prev_sync (vault, profile, key, entity, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (vault, profile, key) \
             DO UPDATE SET entity = excluded.entity, updated_at = excluded.updated_at",
        )
        .bind(vault)
        .bind(profile)
        .bind(&entity.key)
        .bind(&json)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key = %entity.key, "Saved previous sync record");
        Ok(())
    }

    async fn clear(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM prev_sync WHERE vault = ? AND profile = ? AND key = ?")
            .bind(vault)
            .bind(profile)
            .bind(key)
            .execute(&self.pool)
            .await?;

        tracing::trace!(key, "Cleared previous sync record");
        Ok(())
    }

    async fn get_all(&self, vault: &str, profile: &str) -> anyhow::Result<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT entity FROM prev_sync WHERE vault = ? AND profile = ? ORDER BY key ASC",
        )
        .bind(vault)
        .bind(profile)
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(entity_from_row(row)?);
        }
        Ok(entities)
    }

    async fn upsert_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
        content: &[u8],
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE prev_sync SET content = ? WHERE vault = ? AND profile = ? AND key = ?",
        )
        .bind(content)
        .bind(vault)
        .bind(profile)
        .bind(key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::MissingRecord(key.to_string()).into());
        }
        tracing::trace!(key, bytes = content.len(), "Saved base content");
        Ok(())
    }

    async fn clear_content(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE prev_sync SET content = NULL WHERE vault = ? AND profile = ? AND key = ?",
        )
        .bind(vault)
        .bind(profile)
        .bind(key)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key, "Dropped base content");
        Ok(())
    }

    async fn get_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let content: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            "SELECT content FROM prev_sync WHERE vault = ? AND profile = ? AND key = ?",
        )
        .bind(vault)
        .bind(profile)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(content.flatten())
    }
}

// ============================================================================
// IPlanStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IPlanStore for SqliteStateStore {
    async fn save_plan(&self, vault: &str, profile: &str, plan: &SyncPlan) -> anyhow::Result<()> {
        let json = plan
            .to_json()
            .map_err(|e| anyhow::anyhow!("Failed to serialize plan: {}", e))?;
        let meta = &plan.meta;

        sqlx::query(
            "INSERT INTO sync_plans \
             (run_id, vault, profile, trigger_source, generated_at, total, changes, plan) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(meta.run_id.to_string())
        .bind(vault)
        .bind(profile)
        .bind(meta.trigger.as_str())
        .bind(meta.generated_at.to_rfc3339())
        .bind(i64::try_from(meta.total).unwrap_or(i64::MAX))
        .bind(i64::try_from(meta.changes).unwrap_or(i64::MAX))
        .bind(&json)
        .execute(&self.pool)
        .await?;

        self.prune_plans(vault, profile).await?;

        tracing::debug!(run_id = %meta.run_id, trigger = %meta.trigger, "Saved sync plan");
        Ok(())
    }

    async fn latest_plan(&self, vault: &str, profile: &str) -> anyhow::Result<Option<SyncPlan>> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT plan FROM sync_plans WHERE vault = ? AND profile = ? \
             ORDER BY rowid DESC LIMIT 1",
        )
        .bind(vault)
        .bind(profile)
        .fetch_optional(&self.pool)
        .await?;

        match json {
            Some(json) => Ok(Some(SyncPlan::from_json(&json).map_err(CacheError::from)?)),
            None => Ok(None),
        }
    }
}
