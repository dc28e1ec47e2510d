//! Reconciler: three observations in, one decision per key out
//!
//! Works in two passes:
//!
//! 1. **Ensembling** folds remote entries, then previous-sync records, then
//!    local entries into one keyed map. Local entries come last so they can
//!    pick up the encrypted name the remote side already uses. Excluded
//!    keys never enter the map, but their ancestor folders are remembered
//!    per side. When both live sides are empty the previous-sync records
//!    are ignored: an empty pair is a reset, not a mass deletion.
//! 2. **Decision assignment** visits keys from longest to shortest so every
//!    child is decided before its folder. A child that survives the run
//!    marks its parent folder as kept; a kept folder is never deleted and
//!    is created on whichever side lacks it. A folder that still holds
//!    excluded entries on the side it would be deleted from is skipped
//!    instead, since removing it would fail on every run.
//!
//! Every rule in the table carries a stable branch number that ends up in
//! `MixedEntity::decision_branch`.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use vaultsync_core::config::SyncConfig;
use vaultsync_core::domain::key::{ancestor_keys, normalize_key, parent_key, ROOT_KEY};
use vaultsync_core::domain::{
    ConflictAction, Decision, Entity, MixedEntity, MtimeResolution, SyncDirection,
};
use vaultsync_crypto::NameSnapshot;

use crate::filter::PathFilter;
use crate::SyncError;

// ============================================================================
// ReconcileSettings
// ============================================================================

/// Settings the decision table depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub direction: SyncDirection,
    pub conflict_action: ConflictAction,
    /// Encrypted-size ceiling; `None` means unlimited
    pub size_ceiling: Option<u64>,
    /// Resolution used when comparing mtimes
    pub mtime_resolution: MtimeResolution,
}

impl ReconcileSettings {
    pub fn from_config(config: &SyncConfig, mtime_resolution: MtimeResolution) -> Self {
        Self {
            direction: config.direction,
            conflict_action: config.conflict_action,
            size_ceiling: config.size_ceiling(),
            mtime_resolution,
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Bidirectional,
            conflict_action: ConflictAction::KeepNewer,
            size_ceiling: None,
            mtime_resolution: MtimeResolution::Millis,
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Folder deletions held back by excluded entries inside the folder
const EXCLUDED_LEFTOVER_BRANCHES: [u32; 2] = [70, 71];

/// Folders holding excluded entries, per live side
#[derive(Debug, Default)]
struct ExcludedHolders {
    local: HashSet<String>,
    remote: HashSet<String>,
}

/// Builds the keyed decision map for one run
pub struct Reconciler<'a> {
    settings: ReconcileSettings,
    filter: &'a PathFilter,
    names: &'a NameSnapshot,
}

impl<'a> Reconciler<'a> {
    pub fn new(settings: ReconcileSettings, filter: &'a PathFilter, names: &'a NameSnapshot) -> Self {
        Self {
            settings,
            filter,
            names,
        }
    }

    /// Ensemble the three lists and decide every key
    ///
    /// # Errors
    /// Fails on entities violating their invariants, on unreachable
    /// combinations, on oversized two-sided changes and on kept folders
    /// that were never visited.
    pub fn reconcile(
        &self,
        local: Vec<Entity>,
        prev_sync: Vec<Entity>,
        remote: Vec<Entity>,
    ) -> Result<BTreeMap<String, MixedEntity>, SyncError> {
        let (mut entries, holders) = self.ensemble(local, prev_sync, remote)?;
        self.assign_decisions(&mut entries, &holders)?;
        Ok(entries)
    }

    // ------------------------------------------------------------------------
    // Ensembling
    // ------------------------------------------------------------------------

    fn ensemble(
        &self,
        local: Vec<Entity>,
        prev_sync: Vec<Entity>,
        remote: Vec<Entity>,
    ) -> Result<(BTreeMap<String, MixedEntity>, ExcludedHolders), SyncError> {
        let mut holders = ExcludedHolders::default();
        let remote = synthesize_folders(self.admit(remote, Some(&mut holders.remote))?);
        let local = synthesize_folders(self.admit(local, Some(&mut holders.local))?);
        let prev_sync = self.admit(prev_sync, None)?;

        let mut entries: BTreeMap<String, MixedEntity> = BTreeMap::new();

        for entity in remote {
            let slot = entries
                .entry(entity.key.clone())
                .or_insert_with(|| MixedEntity::new(entity.key.clone()));
            if slot.remote.is_some() {
                return Err(listed_twice(&entity.key, "remote"));
            }
            slot.remote = Some(entity);
        }

        if entries.is_empty() && local.is_empty() {
            debug!(
                records = prev_sync.len(),
                "Both sides are empty, ignoring previous sync records"
            );
        } else {
            for entity in prev_sync {
                let slot = entries
                    .entry(entity.key.clone())
                    .or_insert_with(|| MixedEntity::new(entity.key.clone()));
                if slot.prev_sync.is_some() {
                    return Err(listed_twice(&entity.key, "previous sync"));
                }
                slot.prev_sync = Some(entity);
            }
        }

        for entity in local {
            let slot = entries
                .entry(entity.key.clone())
                .or_insert_with(|| MixedEntity::new(entity.key.clone()));
            if slot.local.is_some() {
                return Err(listed_twice(&entity.key, "local"));
            }
            let mut annotated = self.names.annotate(entity);
            if annotated.key_enc.is_none() {
                annotated.key_enc = slot.remote.as_ref().and_then(|r| r.key_enc.clone());
            }
            slot.local = Some(annotated);
        }

        Ok((entries, holders))
    }

    /// Normalize, filter and validate one observation list
    ///
    /// Ancestors of excluded keys go into `holders` when given.
    fn admit(
        &self,
        entities: Vec<Entity>,
        mut holders: Option<&mut HashSet<String>>,
    ) -> Result<Vec<Entity>, SyncError> {
        let mut out = Vec::with_capacity(entities.len());
        for entity in entities {
            let mut entity = entity.normalized();
            if entity.key == ROOT_KEY || entity.key.is_empty() {
                continue;
            }
            entity.key = normalize_key(&entity.key)?;
            if self.filter.is_excluded(&entity.key) {
                trace!(key = %entity.key, "Excluded by filter");
                if let Some(holders) = holders.as_deref_mut() {
                    holders.extend(ancestor_keys(&entity.key));
                }
                continue;
            }
            entity.validate()?;
            out.push(entity);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Decision assignment
    // ------------------------------------------------------------------------

    fn assign_decisions(
        &self,
        entries: &mut BTreeMap<String, MixedEntity>,
        holders: &ExcludedHolders,
    ) -> Result<(), SyncError> {
        let mut order: Vec<String> = entries.keys().cloned().collect();
        order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut kept_folders: HashSet<String> = HashSet::new();

        for key in order {
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };

            let (decision, branch) = if entry.is_folder() {
                let kept = kept_folders.remove(&key);
                self.decide_folder(entry, kept, holders)?
            } else {
                self.decide_file(entry)?
            };

            entry.decide(decision, branch);
            trace!(key = %key, decision = %decision, branch, "Decided");

            // A held-back folder does not pin its parent; the parent is a
            // holder itself and gets the same treatment
            if decision.keeps_entry() && !EXCLUDED_LEFTOVER_BRANCHES.contains(&branch) {
                kept_folders.insert(parent_key(&key));
            }
        }

        kept_folders.remove(ROOT_KEY);
        if !kept_folders.is_empty() {
            let mut leftover: Vec<String> = kept_folders.into_iter().collect();
            leftover.sort();
            return Err(SyncError::LeftoverKeptFolders(leftover));
        }
        Ok(())
    }

    fn same(&self, a: &Entity, b: &Entity) -> bool {
        a.same_content_as(b, self.settings.mtime_resolution)
    }

    fn too_large(&self, entity: &Entity) -> bool {
        self.settings
            .size_ceiling
            .is_some_and(|limit| entity.effective_size_enc() > limit)
    }

    fn fail_if_too_large(&self, key: &str, entity: &Entity) -> Result<(), SyncError> {
        match self.settings.size_ceiling {
            Some(limit) if entity.effective_size_enc() > limit => Err(SyncError::TooLargeConflict {
                key: key.to_string(),
                size: entity.effective_size_enc(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Decision table for files
    fn decide_file(&self, entry: &MixedEntity) -> Result<(Decision, u32), SyncError> {
        let dir = self.settings.direction;
        let key = entry.key.as_str();

        let decided = match (&entry.local, &entry.remote, &entry.prev_sync) {
            (None, None, Some(_)) => (Decision::OnlyHistory, 1),

            (None, None, None) => {
                return Err(SyncError::UnexpectedDecision {
                    key: key.to_string(),
                    reason: "no observation on any side".to_string(),
                })
            }

            (Some(l), Some(r), _) if self.same(l, r) => (Decision::Equal, 2),

            // Only the remote side moved away from history
            (Some(l), Some(r), Some(p)) if self.same(l, p) => {
                if !dir.can_pull() {
                    (Decision::RemoteIsModifiedButPushOnlyThenDoNothing, 4)
                } else {
                    self.fail_if_too_large(key, r)?;
                    (Decision::RemoteIsModifiedThenPull, 3)
                }
            }

            // Only the local side moved away from history
            (Some(l), Some(r), Some(p)) if self.same(r, p) => {
                if !dir.can_push() {
                    (Decision::LocalIsModifiedButPullOnlyThenDoNothing, 6)
                } else {
                    self.fail_if_too_large(key, l)?;
                    (Decision::LocalIsModifiedThenPush, 5)
                }
            }

            (Some(l), Some(r), p) => self.decide_conflict(key, l, r, p.is_none())?,

            (None, Some(r), None) => {
                if !dir.can_pull() {
                    (Decision::RemoteIsCreatedButPushOnlyThenDoNothing, 30)
                } else if self.too_large(r) {
                    (Decision::RemoteIsCreatedTooLargeThenDoNothing, 31)
                } else {
                    (Decision::RemoteIsCreatedThenPull, 32)
                }
            }

            (None, Some(r), Some(p)) if self.same(r, p) => {
                if dir.can_delete_remote() {
                    (Decision::LocalIsDeletedThusAlsoDeleteRemote, 33)
                } else {
                    (Decision::LocalIsDeletedButRemoteKeptThenDoNothing, 34)
                }
            }

            (None, Some(r), Some(_)) => {
                if !dir.can_pull() {
                    (Decision::RemoteIsModifiedButPushOnlyThenDoNothing, 35)
                } else if self.too_large(r) {
                    (Decision::RemoteIsModifiedTooLargeThenDoNothing, 36)
                } else {
                    (Decision::RemoteIsModifiedThenPull, 37)
                }
            }

            (Some(l), None, None) => {
                if !dir.can_push() {
                    (Decision::LocalIsCreatedButPullOnlyThenDoNothing, 40)
                } else if self.too_large(l) {
                    (Decision::LocalIsCreatedTooLargeThenDoNothing, 41)
                } else {
                    (Decision::LocalIsCreatedThenPush, 42)
                }
            }

            (Some(l), None, Some(p)) if self.same(l, p) => {
                if dir.can_delete_local() {
                    (Decision::RemoteIsDeletedThusAlsoDeleteLocal, 43)
                } else {
                    (Decision::RemoteIsDeletedButLocalKeptThenDoNothing, 44)
                }
            }

            (Some(l), None, Some(_)) => {
                if !dir.can_push() {
                    (Decision::LocalIsModifiedButPullOnlyThenDoNothing, 45)
                } else if self.too_large(l) {
                    (Decision::LocalIsModifiedTooLargeThenDoNothing, 46)
                } else {
                    (Decision::LocalIsModifiedThenPush, 47)
                }
            }
        };

        Ok(decided)
    }

    /// Both sides differ from each other and from history
    fn decide_conflict(
        &self,
        key: &str,
        local: &Entity,
        remote: &Entity,
        created: bool,
    ) -> Result<(Decision, u32), SyncError> {
        self.fail_if_too_large(key, local)?;
        self.fail_if_too_large(key, remote)?;

        let dir = self.settings.direction;
        let keep_local = if created {
            (Decision::ConflictCreatedThenKeepLocal, 10)
        } else {
            (Decision::ConflictModifiedThenKeepLocal, 20)
        };
        let keep_remote = if created {
            (Decision::ConflictCreatedThenKeepRemote, 11)
        } else {
            (Decision::ConflictModifiedThenKeepRemote, 21)
        };
        let offset = if created { 0 } else { 10 };

        if dir.is_directional() {
            return if dir.can_push() {
                Ok(keep_local)
            } else {
                Ok(keep_remote)
            };
        }

        let decided = match self.settings.conflict_action {
            ConflictAction::KeepNewer => {
                if local.mtime() >= remote.mtime() {
                    (keep_local.0, 12 + offset)
                } else {
                    (keep_remote.0, 13 + offset)
                }
            }
            ConflictAction::KeepLarger => {
                if local.effective_size_enc() >= remote.effective_size_enc() {
                    (keep_local.0, 14 + offset)
                } else {
                    (keep_remote.0, 15 + offset)
                }
            }
            ConflictAction::SmartConflict => {
                let decision = if created {
                    Decision::ConflictCreatedThenSmartConflict
                } else {
                    Decision::ConflictModifiedThenSmartConflict
                };
                (decision, 16 + offset)
            }
        };
        Ok(decided)
    }

    /// Presence matrix for folders
    fn decide_folder(
        &self,
        entry: &MixedEntity,
        kept: bool,
        holders: &ExcludedHolders,
    ) -> Result<(Decision, u32), SyncError> {
        let dir = self.settings.direction;
        let holds_local = holders.local.contains(&entry.key);
        let holds_remote = holders.remote.contains(&entry.key);

        let decided = match (
            entry.local.is_some(),
            entry.remote.is_some(),
            entry.prev_sync.is_some(),
            kept,
        ) {
            (true, true, _, true) => (Decision::FolderExistedBothThenDoNothing, 50),
            (true, false, _, true) if dir.can_push() => {
                (Decision::FolderExistedLocalThenAlsoCreateRemote, 51)
            }
            (true, false, _, true) => (Decision::FolderToSkip, 52),
            (false, true, _, true) if dir.can_pull() => {
                (Decision::FolderExistedRemoteThenAlsoCreateLocal, 53)
            }
            (false, true, _, true) => (Decision::FolderToSkip, 54),
            (false, false, _, true) => {
                return Err(SyncError::UnexpectedDecision {
                    key: entry.key.clone(),
                    reason: "folder holds kept entries but exists on neither side".to_string(),
                })
            }

            (true, true, _, false) => (Decision::FolderExistedBothThenDoNothing, 60),
            (true, false, false, false) if dir.can_push() => {
                (Decision::FolderExistedLocalThenAlsoCreateRemote, 61)
            }
            (true, false, false, false) => (Decision::FolderToSkip, 62),
            (false, true, false, false) if dir.can_pull() => {
                (Decision::FolderExistedRemoteThenAlsoCreateLocal, 63)
            }
            (false, true, false, false) => (Decision::FolderToSkip, 64),
            (true, false, true, false) if holds_local => (Decision::FolderToSkip, 70),
            (true, false, true, false) if dir.can_delete_local() => {
                (Decision::FolderToBeDeletedOnLocal, 65)
            }
            (true, false, true, false) => (Decision::FolderToSkip, 66),
            (false, true, true, false) if holds_remote => (Decision::FolderToSkip, 71),
            (false, true, true, false) if dir.can_delete_remote() => {
                (Decision::FolderToBeDeletedOnRemote, 67)
            }
            (false, true, true, false) => (Decision::FolderToSkip, 68),
            (false, false, true, false) => (Decision::OnlyHistory, 69),
            (false, false, false, false) => {
                return Err(SyncError::UnexpectedDecision {
                    key: entry.key.clone(),
                    reason: "no observation on any side".to_string(),
                })
            }
        };
        Ok(decided)
    }
}

fn listed_twice(key: &str, side: &str) -> SyncError {
    SyncError::AmbiguousState {
        key: key.to_string(),
        reason: format!("listed twice by the {side} side"),
    }
}

/// Add folder entries implied by descendant paths but not listed
pub fn synthesize_folders(entities: Vec<Entity>) -> Vec<Entity> {
    let listed: HashSet<String> = entities
        .iter()
        .filter(|e| e.is_folder())
        .map(|e| e.key.clone())
        .collect();

    let mut missing: BTreeMap<String, ()> = BTreeMap::new();
    for entity in &entities {
        for ancestor in ancestor_keys(&entity.key) {
            if !listed.contains(&ancestor) {
                missing.insert(ancestor, ());
            }
        }
    }

    let mut out = entities;
    out.extend(
        missing
            .into_keys()
            .map(|key| Entity::folder(key).synthesized()),
    );
    out
}
