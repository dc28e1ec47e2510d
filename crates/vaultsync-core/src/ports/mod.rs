//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The reconciler and executor depend only on
//! these traits; implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStorage`] - One replica (local filesystem, remote backend, encrypted wrapper)
//! - [`IPrevSyncStore`] - Durable previous-sync records and base content
//! - [`IPlanStore`] - Persisted plans for audit and inspection

pub mod prev_sync_store;
pub mod storage;

pub use prev_sync_store::{IPlanStore, IPrevSyncStore};
pub use storage::{is_not_found, IStorage, StorageError};
