//! vaultsync Conflict - Content-level conflict resolution
//!
//! Provides:
//! - Three-way line merge, with an LCS-derived base when no history exists
//! - Defused conflict markers in merged text
//! - `.dup` naming for conflict copies
//! - A resolver that merges mergeable text and duplicates everything else

pub mod error;
pub mod merge;
pub mod namer;
pub mod resolver;

pub use error::ConflictError;
pub use merge::{is_mergeable, merge_three_way, merge_two_way, MergeOutcome, MAX_MERGE_SIZE};
pub use namer::ConflictNamer;
pub use resolver::{ConflictResolver, Resolution};
