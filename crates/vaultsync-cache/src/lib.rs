//! vaultsync Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - Previous-sync records, one per synchronized key
//! - Last synchronized content of mergeable files
//! - Generated sync plans
//!
//! ## Architecture
//!
//! This crate implements the `IPrevSyncStore` and `IPlanStore` ports from
//! `vaultsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use vaultsync_cache::{DatabasePool, SqliteStateStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/vaultsync/state.db")).await?;
//! let store = SqliteStateStore::new(pool.pool().clone());
//! // Use store as IPrevSyncStore and IPlanStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::{PlanRecord, SqliteStateStore, DEFAULT_PLAN_RETENTION};

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Content was stored for a key without a previous-sync record
    #[error("No previous-sync record for '{0}'")]
    MissingRecord(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
