//! Error types for conflict resolution

use thiserror::Error;

/// Errors that can occur while resolving a conflict
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The key cannot be given a duplicate name
    #[error("cannot derive a duplicate name from '{0}'")]
    InvalidName(String),

    /// No free duplicate name was found
    #[error("no free duplicate name for '{0}'")]
    NamesExhausted(String),

    /// Resolution operation failed (read, write or merge)
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
