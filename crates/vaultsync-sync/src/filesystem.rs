//! Directory-backed storage adapter (secondary/driven adapter)
//!
//! Implements [`IStorage`] on top of a root directory using `tokio::fs`.
//! Serves as the local vault and, pointed at another directory, as a
//! plain remote.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: content goes to a temporary sibling first, gets its
//!   modification time, then is renamed over the target. The sibling has a
//!   short random name so a target already at the file name limit still
//!   has room for it.
//! - **Non-recursive removal**: folders are removed with `remove_dir`, so a
//!   folder that still has content fails instead of silently losing it.
//!   Folders holding filtered-out entries are never planned for removal.
//! - **Missing root**: walking a root that does not exist is an error, not
//!   an empty listing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument, warn};

use vaultsync_core::domain::key::normalize_key;
use vaultsync_core::domain::{Entity, MtimeResolution};
use vaultsync_core::ports::{IStorage, StorageError};

/// Suffix of in-flight temporary files; never listed by `walk`
pub const TEMP_SUFFIX: &str = ".vaultsync-tmp";

// ============================================================================
// FsStorage struct
// ============================================================================

/// [`IStorage`] over a directory tree
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    resolution: MtimeResolution,
}

impl FsStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolution: MtimeResolution::Millis,
        }
    }

    /// Override the timestamp resolution the backing filesystem keeps
    #[must_use]
    pub fn with_mtime_resolution(mut self, resolution: MtimeResolution) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_of(&self, key: &str) -> anyhow::Result<PathBuf> {
        let key = normalize_key(key)?;
        Ok(self.root.join(key.trim_end_matches('/')))
    }

    async fn entity_at(&self, key: &str, path: &Path) -> anyhow::Result<Entity> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(e, key))?;
        Ok(entity_from_metadata(key, &metadata))
    }
}

// ============================================================================
// IStorage implementation
// ============================================================================

#[async_trait::async_trait]
impl IStorage for FsStorage {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn mtime_resolution(&self) -> MtimeResolution {
        self.resolution
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn walk(&self) -> anyhow::Result<Vec<Entity>> {
        match tokio::fs::metadata(&self.root).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(StorageError::Precondition(format!(
                    "{} is not a directory",
                    self.root.display()
                ))
                .into())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::Precondition(format!(
                    "root {} does not exist",
                    self.root.display()
                ))
                .into())
            }
            Err(e) => return Err(e.into()),
        }

        let mut out = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    warn!(path = ?entry.path(), "Skipping non UTF-8 name");
                    continue;
                };
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    let key = format!("{prefix}{name}/");
                    out.push(Entity::folder(key.clone()));
                    pending.push((entry.path(), key));
                } else if file_type.is_file() {
                    if name.ends_with(TEMP_SUFFIX) {
                        continue;
                    }
                    let key = format!("{prefix}{name}");
                    let metadata = entry.metadata().await?;
                    out.push(entity_from_metadata(&key, &metadata));
                } else {
                    debug!(path = ?entry.path(), "Skipping special file");
                }
            }
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(entries = out.len(), "Walk complete");
        Ok(out)
    }

    async fn stat(&self, key: &str) -> anyhow::Result<Entity> {
        let path = self.path_of(key)?;
        self.entity_at(key, &path).await
    }

    #[instrument(skip(self))]
    async fn mkdir(
        &self,
        key: &str,
        _mtime: Option<i64>,
        _ctime: Option<i64>,
    ) -> anyhow::Result<Entity> {
        let path = self.path_of(key)?;
        tokio::fs::create_dir_all(&path).await?;
        debug!("Directory created");
        self.entity_at(key, &path).await
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn write_file(
        &self,
        key: &str,
        content: &[u8],
        mtime: i64,
        _ctime: i64,
    ) -> anyhow::Result<Entity> {
        let target = self.path_of(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = target.with_file_name(format!(
            ".{}{TEMP_SUFFIX}",
            uuid::Uuid::new_v4().simple()
        ));

        tokio::fs::write(&tmp_path, content).await?;

        let modified = system_time(mtime);
        let stamp_path = tmp_path.clone();
        let stamped = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&stamp_path)
                .and_then(|f| f.set_modified(modified))
        })
        .await?;
        if let Err(e) = stamped {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tokio::fs::rename(&tmp_path, &target).await?;
        debug!("Write complete");
        self.entity_at(key, &target).await
    }

    async fn read_file(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_of(key)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(e, key))
    }

    #[instrument(skip(self))]
    async fn rm(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_of(key)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(e, key))?;

        if metadata.is_dir() {
            tokio::fs::remove_dir(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        debug!("Removed");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn io_error(err: std::io::Error, key: &str) -> anyhow::Error {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string()).into()
    } else {
        err.into()
    }
}

fn entity_from_metadata(key: &str, metadata: &std::fs::Metadata) -> Entity {
    if metadata.is_dir() {
        let key = if key.ends_with('/') {
            key.to_string()
        } else {
            format!("{key}/")
        };
        return Entity::folder(key);
    }
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
    Entity::file(key, mtime, metadata.len())
}

fn system_time(mtime_ms: i64) -> SystemTime {
    match u64::try_from(mtime_ms) {
        Ok(ms) => UNIX_EPOCH + Duration::from_millis(ms),
        Err(_) => UNIX_EPOCH,
    }
}

// ============================================================================
// Unit tests
// ============================================================================
