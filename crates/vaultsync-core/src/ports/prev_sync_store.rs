//! Previous-sync record store and plan store ports
//!
//! The previous-sync store is the only state that survives between runs.
//! Records are namespaced by `(vault, profile)` so several profiles can
//! sync the same tree without interfering. Records are upserted or cleared
//! one key at a time as decisions execute; nothing rewrites the table in
//! bulk.

use crate::domain::{Entity, SyncPlan};

/// Durable key to last-converged `Entity` table
#[async_trait::async_trait]
pub trait IPrevSyncStore: Send + Sync {
    /// Insert or replace the record for `entity.key`
    async fn upsert(&self, vault: &str, profile: &str, entity: &Entity) -> anyhow::Result<()>;

    /// Remove the record (and any stored base content) for a key
    async fn clear(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()>;

    /// All records of a profile
    async fn get_all(&self, vault: &str, profile: &str) -> anyhow::Result<Vec<Entity>>;

    /// Store the last synchronized content of a mergeable file
    async fn upsert_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
        content: &[u8],
    ) -> anyhow::Result<()>;

    /// Drop the stored base content of a key, keeping its record
    async fn clear_content(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()>;

    /// Last synchronized content of a key, if any was stored
    async fn get_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
    ) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Persisted plans, kept for audit and the `plan` command
#[async_trait::async_trait]
pub trait IPlanStore: Send + Sync {
    /// Persist a freshly built plan
    async fn save_plan(&self, vault: &str, profile: &str, plan: &SyncPlan) -> anyhow::Result<()>;

    /// Most recently saved plan of a profile
    async fn latest_plan(&self, vault: &str, profile: &str) -> anyhow::Result<Option<SyncPlan>>;
}
