//! Plan executor
//!
//! Applies a decided [`SyncPlan`] to both replicas. Entries are split into
//! four phases that run strictly one after another:
//!
//! 1. mark-synced: refresh or clear previous-sync records, no I/O on the
//!    replicas
//! 2. folder creation: one sub-partition per depth, shallowest first
//! 3. deletion: one sub-partition per depth, deepest first
//! 4. transfer: pushes, pulls and conflict resolution
//!
//! Each sub-partition is drained through a bounded worker pool. Task
//! failures are collected; once [`ERROR_THRESHOLD`] failures have piled up
//! the remaining tasks are cancelled before they start. A sub-partition
//! with any failure ends the run after it settles.
//!
//! Every task that ran is reported to the progress observer, failed ones
//! included. Cancelled tasks never ran and are only counted in the
//! summary.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Context};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vaultsync_conflict::{is_mergeable, ConflictNamer, ConflictResolver, Resolution};
use vaultsync_core::domain::key::key_depth;
use vaultsync_core::domain::{Decision, DecisionPhase, Entity, MixedEntity, SyncPlan};
use vaultsync_core::ports::{is_not_found, IPrevSyncStore, IStorage};

use crate::progress::SyncProgress;
use crate::{SyncError, ERROR_THRESHOLD};

// ============================================================================
// Protect-modify guard
// ============================================================================

/// Refuse plans that would modify or delete too large a share of files
///
/// Only file entries still present in history or on a side count towards
/// the total, whatever the size of the vault. A threshold of 100 disables
/// the guard.
pub fn check_protect(plan: &SyncPlan, threshold: u8) -> Result<(), SyncError> {
    if threshold >= 100 {
        return Ok(());
    }

    let mut total = 0usize;
    let mut affected = 0usize;
    for entry in plan.entries.values().filter(|e| !e.is_folder()) {
        let Some(decision) = entry.decision else {
            continue;
        };
        if decision == Decision::OnlyHistory {
            continue;
        }
        total += 1;
        if decision.counts_as_modification() {
            affected += 1;
        }
    }

    if total == 0 {
        return Ok(());
    }
    if affected * 100 > usize::from(threshold) * total {
        warn!(affected, total, threshold, "Protect-modify guard tripped");
        return Err(SyncError::ProtectModifyTripped {
            affected,
            total,
            threshold,
        });
    }
    Ok(())
}

// ============================================================================
// ExecutionSummary
// ============================================================================

/// Counts of what the executor did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub marked: usize,
    pub skipped: usize,
    pub folders_created: usize,
    pub deleted: usize,
    pub pushed: usize,
    pub pulled: usize,
    pub merged: usize,
    pub duplicated: usize,
    pub cancelled: usize,
}

impl ExecutionSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Marked => self.marked += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::FolderCreated => self.folders_created += 1,
            TaskOutcome::Deleted => self.deleted += 1,
            TaskOutcome::Pushed => self.pushed += 1,
            TaskOutcome::Pulled => self.pulled += 1,
            TaskOutcome::Merged => self.merged += 1,
            TaskOutcome::Duplicated => self.duplicated += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Number of tasks that touched a replica
    #[must_use]
    pub fn applied(&self) -> usize {
        self.folders_created
            + self.deleted
            + self.pushed
            + self.pulled
            + self.merged
            + self.duplicated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Marked,
    Skipped,
    FolderCreated,
    Deleted,
    Pushed,
    Pulled,
    Merged,
    Duplicated,
    Cancelled,
}

// ============================================================================
// PlanExecutor
// ============================================================================

/// Runs the tasks of one plan against the local and remote replicas
pub struct PlanExecutor {
    local: Arc<dyn IStorage>,
    remote: Arc<dyn IStorage>,
    prev_sync: Arc<dyn IPrevSyncStore>,
    resolver: ConflictResolver,
    vault: String,
    profile: String,
    concurrency: usize,
}

impl PlanExecutor {
    pub fn new(
        local: Arc<dyn IStorage>,
        remote: Arc<dyn IStorage>,
        prev_sync: Arc<dyn IPrevSyncStore>,
        vault: impl Into<String>,
        profile: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        let vault = vault.into();
        let profile = profile.into();
        let resolver = ConflictResolver::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&prev_sync),
            vault.clone(),
            profile.clone(),
        );
        Self {
            local,
            remote,
            prev_sync,
            resolver,
            vault,
            profile,
            concurrency: concurrency.max(1),
        }
    }

    /// Execute every entry of the plan, phase by phase
    ///
    /// # Errors
    /// Returns [`SyncError::Aggregate`] with the collected task failures
    /// of the first sub-partition that had any.
    #[tracing::instrument(skip_all, fields(run_id = %plan.meta.run_id, entries = plan.entries.len()))]
    pub async fn execute(
        &self,
        plan: &SyncPlan,
        progress: &dyn SyncProgress,
    ) -> Result<ExecutionSummary, SyncError> {
        let dup_keys = reserve_dup_keys(plan)?;
        let token = CancellationToken::new();
        let total = plan.entries.len();
        let mut done = 0usize;
        let mut summary = ExecutionSummary::default();

        for phase in [
            DecisionPhase::MarkSynced,
            DecisionPhase::FolderCreation,
            DecisionPhase::Deletion,
            DecisionPhase::Transfer,
        ] {
            for batch in partition(plan, phase) {
                debug!(%phase, tasks = batch.len(), "Running sub-partition");

                let mut errors: Vec<String> = Vec::new();
                let token = &token;
                let dup_keys = &dup_keys;

                let mut results = stream::iter(batch)
                    .map(|entry| async move {
                        if token.is_cancelled() {
                            return (entry, Ok(TaskOutcome::Cancelled));
                        }
                        let result = self.run_task(entry, dup_keys).await;
                        (entry, result)
                    })
                    .buffer_unordered(self.concurrency);

                while let Some((entry, result)) = results.next().await {
                    if matches!(result, Ok(TaskOutcome::Cancelled)) {
                        summary.record(TaskOutcome::Cancelled);
                        continue;
                    }

                    done += 1;
                    if let Some(decision) = entry.decision {
                        progress.on_task(done, total, &entry.key, decision);
                    }
                    match result {
                        Ok(outcome) => summary.record(outcome),
                        Err(err) => {
                            warn!(key = %entry.key, error = %format!("{err:#}"), "Task failed");
                            errors.push(format!("{}: {err:#}", entry.key));
                            if errors.len() >= ERROR_THRESHOLD && !token.is_cancelled() {
                                warn!(
                                    threshold = ERROR_THRESHOLD,
                                    "Error threshold reached, cancelling remaining tasks"
                                );
                                token.cancel();
                            }
                        }
                    }
                }

                if !errors.is_empty() {
                    let threshold_reached = errors.len() >= ERROR_THRESHOLD;
                    return Err(SyncError::Aggregate {
                        errors,
                        threshold_reached,
                    });
                }
            }
        }

        info!(
            marked = summary.marked,
            folders_created = summary.folders_created,
            deleted = summary.deleted,
            pushed = summary.pushed,
            pulled = summary.pulled,
            merged = summary.merged,
            duplicated = summary.duplicated,
            "Plan executed"
        );
        Ok(summary)
    }

    async fn run_task(
        &self,
        entry: &MixedEntity,
        dup_keys: &HashMap<String, String>,
    ) -> anyhow::Result<TaskOutcome> {
        let Some(decision) = entry.decision else {
            bail!("entry has no decision");
        };
        let key = entry.key.as_str();

        match decision {
            Decision::Equal | Decision::FolderExistedBothThenDoNothing => {
                self.mark_synced(entry).await?;
                Ok(TaskOutcome::Marked)
            }
            Decision::OnlyHistory => {
                self.prev_sync.clear(&self.vault, &self.profile, key).await?;
                Ok(TaskOutcome::Marked)
            }
            d if d.is_withheld() => Ok(TaskOutcome::Skipped),

            Decision::FolderExistedLocalThenAlsoCreateRemote => {
                let local = side(&entry.local, key, "local")?;
                let created = self.remote.mkdir(key, None, None).await?;
                self.record(&with_remote_names(local.clone(), &created), None)
                    .await?;
                Ok(TaskOutcome::FolderCreated)
            }
            Decision::FolderExistedRemoteThenAlsoCreateLocal => {
                let remote = side(&entry.remote, key, "remote")?;
                let created = self.local.mkdir(key, None, None).await?;
                self.record(&with_remote_names(created, remote), None).await?;
                Ok(TaskOutcome::FolderCreated)
            }

            Decision::LocalIsDeletedThusAlsoDeleteRemote | Decision::FolderToBeDeletedOnRemote => {
                remove(self.remote.as_ref(), key).await?;
                self.prev_sync.clear(&self.vault, &self.profile, key).await?;
                Ok(TaskOutcome::Deleted)
            }
            Decision::RemoteIsDeletedThusAlsoDeleteLocal | Decision::FolderToBeDeletedOnLocal => {
                remove(self.local.as_ref(), key).await?;
                self.prev_sync.clear(&self.vault, &self.profile, key).await?;
                Ok(TaskOutcome::Deleted)
            }

            d if d.is_smart_conflict() => {
                let dup_key = dup_keys
                    .get(key)
                    .with_context(|| format!("no duplicate name reserved for '{key}'"))?;
                match self.resolver.resolve(entry, dup_key).await? {
                    Resolution::Merged {
                        entity, content, ..
                    } => {
                        self.record(&entity, Some(&content)).await?;
                        Ok(TaskOutcome::Merged)
                    }
                    Resolution::Duplicated {
                        original,
                        duplicate,
                    } => {
                        self.record(&original, None).await?;
                        self.record(&duplicate, None).await?;
                        Ok(TaskOutcome::Duplicated)
                    }
                }
            }
            d if d.is_push() => {
                self.push(entry).await?;
                Ok(TaskOutcome::Pushed)
            }
            d if d.is_pull() => {
                self.pull(entry).await?;
                Ok(TaskOutcome::Pulled)
            }

            other => bail!("decision {other} has no task"),
        }
    }

    /// Refresh the history record of an unchanged entry
    ///
    /// A changed record also reseeds the merge base of mergeable files from
    /// the local copy.
    async fn mark_synced(&self, entry: &MixedEntity) -> anyhow::Result<()> {
        let local = side(&entry.local, &entry.key, "local")?;
        let remote = side(&entry.remote, &entry.key, "remote")?;
        let record = with_remote_names(local.clone(), remote);
        if entry.prev_sync.as_ref() == Some(&record) {
            return Ok(());
        }

        if is_mergeable(&record) {
            let content = self.local.read_file(&entry.key).await?;
            self.record(&record, Some(&content)).await
        } else {
            self.record(&record, None).await
        }
    }

    async fn push(&self, entry: &MixedEntity) -> anyhow::Result<()> {
        let key = entry.key.as_str();
        let local = side(&entry.local, key, "local")?;
        let content = self.local.read_file(key).await?;
        let mtime = local
            .mtime()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let written = self.remote.write_file(key, &content, mtime, mtime).await?;
        debug!(key, bytes = content.len(), "Pushed");
        self.record(&with_remote_names(local.clone(), &written), Some(&content))
            .await
    }

    async fn pull(&self, entry: &MixedEntity) -> anyhow::Result<()> {
        let key = entry.key.as_str();
        let remote = side(&entry.remote, key, "remote")?;
        let content = self.remote.read_file(key).await?;
        let mtime = remote
            .mtime()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let written = self.local.write_file(key, &content, mtime, mtime).await?;
        debug!(key, bytes = content.len(), "Pulled");
        self.record(&with_remote_names(written, remote), Some(&content))
            .await
    }

    /// Store the history record, plus the content of mergeable text files
    ///
    /// A file without storable content loses whatever base it had, so a
    /// later merge never runs against an older version.
    async fn record(&self, entity: &Entity, content: Option<&[u8]>) -> anyhow::Result<()> {
        self.prev_sync
            .upsert(&self.vault, &self.profile, entity)
            .await?;
        if entity.is_folder() {
            return Ok(());
        }
        match content {
            Some(content) if is_mergeable(entity) && std::str::from_utf8(content).is_ok() => {
                self.prev_sync
                    .upsert_content(&self.vault, &self.profile, &entity.key, content)
                    .await
            }
            _ => {
                self.prev_sync
                    .clear_content(&self.vault, &self.profile, &entity.key)
                    .await
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn side<'a>(entity: &'a Option<Entity>, key: &str, name: &str) -> anyhow::Result<&'a Entity> {
    entity
        .as_ref()
        .with_context(|| format!("'{key}' has no {name} observation"))
}

/// Copy the remote's encrypted name and size onto a local-side entity
fn with_remote_names(mut entity: Entity, remote: &Entity) -> Entity {
    entity.key_enc = remote.key_enc.clone().or_else(|| Some(remote.key.clone()));
    entity.size_enc = remote.size_enc.or(Some(remote.size));
    entity
}

/// Remove a key, treating an already missing key as done
async fn remove(storage: &dyn IStorage, key: &str) -> anyhow::Result<()> {
    match storage.rm(key).await {
        Ok(()) => Ok(()),
        Err(err) if is_not_found(&err) => {
            debug!(key, "Already gone");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Split one phase into the sub-partitions that run one after another
fn partition(plan: &SyncPlan, phase: DecisionPhase) -> Vec<Vec<&MixedEntity>> {
    let entries: Vec<&MixedEntity> = plan.in_phase(phase).collect();
    if entries.is_empty() {
        return Vec::new();
    }

    match phase {
        DecisionPhase::FolderCreation | DecisionPhase::Deletion => {
            let mut by_depth: BTreeMap<usize, Vec<&MixedEntity>> = BTreeMap::new();
            for entry in entries {
                by_depth.entry(key_depth(&entry.key)).or_default().push(entry);
            }
            let batches = by_depth.into_values();
            if phase == DecisionPhase::Deletion {
                batches.rev().collect()
            } else {
                batches.collect()
            }
        }
        DecisionPhase::MarkSynced | DecisionPhase::Transfer => vec![entries],
    }
}

/// Reserve a free duplicate name for every smart-conflict entry
///
/// Names are handed out in key order so a rerun picks the same ones.
fn reserve_dup_keys(plan: &SyncPlan) -> Result<HashMap<String, String>, SyncError> {
    let mut reserved: HashSet<String> = HashSet::new();
    let mut out = HashMap::new();

    for entry in plan.entries.values() {
        if !entry.decision.is_some_and(Decision::is_smart_conflict) {
            continue;
        }
        let dup = ConflictNamer::generate_unique(&entry.key, |candidate| {
            plan.entries.contains_key(candidate) || reserved.contains(candidate)
        })?;
        reserved.insert(dup.clone());
        out.insert(entry.key.clone(), dup);
    }
    Ok(out)
}
