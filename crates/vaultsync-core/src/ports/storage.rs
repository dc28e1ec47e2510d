//! Storage port (driven/secondary port)
//!
//! Every replica, local or remote, is reached through [`IStorage`]. Keys
//! use `/` separators and folder keys end with `/`.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because backend errors are adapter-specific.
//! - A missing key is reported as [`StorageError::NotFound`] wrapped in the
//!   `anyhow::Error`; use [`is_not_found`] to test for it.
//! - Mutating calls return the entity as actually stored. The executor
//!   records that value and never re-reads.

use thiserror::Error;

use crate::domain::{Entity, MtimeResolution};

/// Typed storage failures that callers may want to match on
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key does not exist on this replica
    #[error("Not found: {0}")]
    NotFound(String),

    /// The adapter was used before a required setup step
    #[error("Precondition failed: {0}")]
    Precondition(String),
}

/// Returns true if the error chain contains `StorageError::NotFound`
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<StorageError>(),
            Some(StorageError::NotFound(_))
        )
    })
}

/// One replica of the file tree
#[async_trait::async_trait]
pub trait IStorage: Send + Sync {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    /// Timestamp granularity this backend preserves
    fn mtime_resolution(&self) -> MtimeResolution {
        MtimeResolution::Millis
    }

    /// Full recursive listing of files and folders
    async fn walk(&self) -> anyhow::Result<Vec<Entity>>;

    /// Metadata of a single key
    async fn stat(&self, key: &str) -> anyhow::Result<Entity>;

    /// Create a folder; succeeds if it already exists
    async fn mkdir(&self, key: &str, mtime: Option<i64>, ctime: Option<i64>)
        -> anyhow::Result<Entity>;

    /// Create or replace a file
    async fn write_file(
        &self,
        key: &str,
        content: &[u8],
        mtime: i64,
        ctime: i64,
    ) -> anyhow::Result<Entity>;

    /// Read a whole file
    async fn read_file(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Remove a file or an empty folder
    async fn rm(&self, key: &str) -> anyhow::Result<()>;
}
