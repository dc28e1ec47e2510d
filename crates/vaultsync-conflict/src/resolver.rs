//! Smart conflict resolution
//!
//! Applies a `*_then_smart_conflict` decision by performing the actual
//! storage operations:
//! - Mergeable text: merge both versions and write the result to both
//!   sides, remote first so its stored mtime can be reused locally
//! - Anything else: keep both by copying the local version to a `.dup`
//!   name on both sides and downloading the remote version over the
//!   original local key

use std::sync::Arc;

use tracing::{debug, info, warn};

use vaultsync_core::domain::{Decision, Entity, MixedEntity};
use vaultsync_core::ports::{IPrevSyncStore, IStorage};

use crate::error::ConflictError;
use crate::merge::{is_mergeable, merge_three_way, merge_two_way};

/// What the resolver did for one key
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Both sides now hold the merged text
    Merged {
        /// Entity as written locally, carrying the remote name and size
        entity: Entity,
        /// The merged content
        content: Vec<u8>,
        /// Conflicting chunks left between markers
        conflicts: usize,
    },
    /// The local version lives on under a duplicate name
    Duplicated {
        /// The remote version, now also stored locally under the original key
        original: Entity,
        /// The former local version under its new key, on both sides
        duplicate: Entity,
    },
}

/// Executes smart-conflict decisions over the two replicas
pub struct ConflictResolver {
    local: Arc<dyn IStorage>,
    remote: Arc<dyn IStorage>,
    prev_sync: Arc<dyn IPrevSyncStore>,
    vault: String,
    profile: String,
}

impl ConflictResolver {
    pub fn new(
        local: Arc<dyn IStorage>,
        remote: Arc<dyn IStorage>,
        prev_sync: Arc<dyn IPrevSyncStore>,
        vault: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            prev_sync,
            vault: vault.into(),
            profile: profile.into(),
        }
    }

    /// Resolve one smart-conflict entry
    ///
    /// `dup_key` is the free name reserved for the local copy in case the
    /// content cannot be merged.
    pub async fn resolve(
        &self,
        mixed: &MixedEntity,
        dup_key: &str,
    ) -> Result<Resolution, ConflictError> {
        let (Some(local), Some(remote)) = (&mixed.local, &mixed.remote) else {
            return Err(ConflictError::ResolutionFailed(format!(
                "'{}' is not present on both sides",
                mixed.key
            )));
        };

        if is_mergeable(local) && is_mergeable(remote) {
            let (local_bytes, remote_bytes) = tokio::try_join!(
                self.local.read_file(&mixed.key),
                self.remote.read_file(&mixed.key)
            )?;

            match (String::from_utf8(local_bytes), String::from_utf8(remote_bytes)) {
                (Ok(local_text), Ok(remote_text)) => {
                    let modified = mixed.decision == Some(Decision::ConflictModifiedThenSmartConflict);
                    return self.merge(&mixed.key, modified, &local_text, &remote_text).await;
                }
                _ => {
                    debug!(key = %mixed.key, "Content is not UTF-8, falling back to duplicate");
                }
            }
        }

        self.duplicate(&mixed.key, local, remote, dup_key).await
    }

    async fn merge(
        &self,
        key: &str,
        modified: bool,
        local_text: &str,
        remote_text: &str,
    ) -> Result<Resolution, ConflictError> {
        let base = if modified {
            self.prev_sync
                .get_content(&self.vault, &self.profile, key)
                .await?
                .and_then(|bytes| String::from_utf8(bytes).ok())
        } else {
            None
        };

        let outcome = match &base {
            Some(base) => merge_three_way(base, local_text, remote_text),
            None => merge_two_way(local_text, remote_text),
        };
        if !outcome.is_clean() {
            warn!(key, conflicts = outcome.conflicts, "Merged with conflict markers");
        }

        let content = outcome.text.into_bytes();
        let now = chrono::Utc::now().timestamp_millis();

        let remote_entity = self.remote.write_file(key, &content, now, now).await?;
        let mtime = remote_entity.mtime().unwrap_or(now);
        let mut entity = self.local.write_file(key, &content, mtime, mtime).await?;
        entity.key_enc = remote_entity.key_enc.clone();
        entity.size_enc = remote_entity.size_enc.or(Some(remote_entity.size));

        info!(
            key,
            three_way = base.is_some(),
            conflicts = outcome.conflicts,
            "Conflict merged"
        );

        Ok(Resolution::Merged {
            entity,
            content,
            conflicts: outcome.conflicts,
        })
    }

    async fn duplicate(
        &self,
        key: &str,
        local: &Entity,
        remote: &Entity,
        dup_key: &str,
    ) -> Result<Resolution, ConflictError> {
        if dup_key == key || dup_key.ends_with('/') {
            return Err(ConflictError::InvalidName(dup_key.to_string()));
        }

        let content = self.local.read_file(key).await?;
        let local_mtime = local.mtime().unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let remote_mtime = remote.mtime().unwrap_or(local_mtime);

        let local_dup = self
            .local
            .write_file(dup_key, &content, local_mtime, local_mtime)
            .await?;

        let (remote_dup, original) = tokio::try_join!(
            self.remote.write_file(dup_key, &content, local_mtime, local_mtime),
            async {
                let data = self.remote.read_file(key).await?;
                self.local
                    .write_file(key, &data, remote_mtime, remote_mtime)
                    .await
            }
        )?;

        let mut duplicate = local_dup;
        duplicate.key_enc = remote_dup.key_enc.clone();
        duplicate.size_enc = remote_dup.size_enc.or(Some(remote_dup.size));

        let mut original = original;
        original.key_enc = remote.key_enc.clone();
        original.size_enc = remote.size_enc.or(Some(remote.size));

        info!(key, duplicate = dup_key, "Conflict kept both versions");

        Ok(Resolution::Duplicated {
            original,
            duplicate,
        })
    }
}
