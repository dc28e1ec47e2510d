//! Entity - one observation of a file or folder from one side
//!
//! Entities are produced by storage backends (`walk`, `stat`, and every
//! mutating call) and by the previous-sync record store. They are plain
//! data: the reconciler compares them, it never mutates a backend through
//! them.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::key::is_folder_key;

// ============================================================================
// MtimeResolution
// ============================================================================

/// Timestamp granularity a backend preserves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MtimeResolution {
    /// Millisecond timestamps survive a round trip
    #[default]
    Millis,
    /// Only whole seconds survive a round trip
    Seconds,
}

impl MtimeResolution {
    /// Round a millisecond timestamp to this resolution (floor)
    #[must_use]
    pub fn round(self, mtime_ms: i64) -> i64 {
        match self {
            Self::Millis => mtime_ms,
            Self::Seconds => mtime_ms - mtime_ms.rem_euclid(1000),
        }
    }

    /// The coarser of two resolutions
    #[must_use]
    pub fn coarsest(self, other: Self) -> Self {
        if self == Self::Seconds || other == Self::Seconds {
            Self::Seconds
        } else {
            Self::Millis
        }
    }
}

// ============================================================================
// Entity
// ============================================================================

/// One snapshot observation of a path
///
/// Times are milliseconds since the Unix epoch. `size` is the logical
/// (plain) size, `size_raw` what the backend reports natively and
/// `size_enc` the encrypted size as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized, decrypted key (folders end with `/`)
    pub key: String,
    /// Storage-native key
    pub key_raw: String,
    /// Encrypted key, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_enc: Option<String>,
    /// Client-asserted modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_cli: Option<i64>,
    /// Server-asserted modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_svr: Option<i64>,
    /// Logical size in bytes
    pub size: u64,
    /// Storage-native size in bytes
    pub size_raw: u64,
    /// Encrypted size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_enc: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Folder inferred from descendant paths rather than listed natively
    #[serde(default)]
    pub synthesized_folder: bool,
}

impl Entity {
    /// Create a file entity with a client mtime
    pub fn file(key: impl Into<String>, mtime: i64, size: u64) -> Self {
        let key = key.into();
        Self {
            key_raw: key.clone(),
            key,
            key_enc: None,
            mtime_cli: Some(mtime),
            mtime_svr: None,
            size,
            size_raw: size,
            size_enc: None,
            hash: None,
            etag: None,
            synthesized_folder: false,
        }
        .normalized()
    }

    /// Create a folder entity (size is always 0)
    pub fn folder(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            key_raw: key.clone(),
            key,
            key_enc: None,
            mtime_cli: None,
            mtime_svr: None,
            size: 0,
            size_raw: 0,
            size_enc: None,
            hash: None,
            etag: None,
            synthesized_folder: false,
        }
    }

    /// Set the server mtime
    #[must_use]
    pub fn with_server_mtime(mut self, mtime: i64) -> Self {
        self.mtime_svr = Some(mtime);
        self.normalized()
    }

    /// Set the encrypted key and size
    #[must_use]
    pub fn with_encrypted(mut self, key_enc: impl Into<String>, size_enc: u64) -> Self {
        self.key_enc = Some(key_enc.into());
        self.size_enc = Some(size_enc);
        self
    }

    /// Mark as a synthesized folder
    #[must_use]
    pub fn synthesized(mut self) -> Self {
        self.synthesized_folder = true;
        self
    }

    /// Returns true if this entity is a folder
    #[must_use]
    pub fn is_folder(&self) -> bool {
        is_folder_key(&self.key)
    }

    /// Treat `0` timestamps as unknown
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.mtime_cli == Some(0) {
            self.mtime_cli = None;
        }
        if self.mtime_svr == Some(0) {
            self.mtime_svr = None;
        }
        self
    }

    /// Preferred modification time (client first, then server)
    #[must_use]
    pub fn mtime(&self) -> Option<i64> {
        self.mtime_cli.or(self.mtime_svr)
    }

    /// Modification time rounded to the given resolution
    #[must_use]
    pub fn rounded_mtime(&self, resolution: MtimeResolution) -> Option<i64> {
        self.mtime().map(|m| resolution.round(m))
    }

    /// Encrypted size, falling back to the logical size
    #[must_use]
    pub fn effective_size_enc(&self) -> u64 {
        self.size_enc.unwrap_or(self.size)
    }

    /// Check structural invariants
    ///
    /// # Errors
    /// Returns `DomainError::AmbiguousState` when a file has no mtime or a
    /// folder reports a non-zero size.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.is_folder() {
            if self.size != 0 {
                return Err(DomainError::AmbiguousState {
                    key: self.key.clone(),
                    reason: format!("folder with non-zero size {}", self.size),
                });
            }
        } else if self.mtime().is_none() {
            return Err(DomainError::AmbiguousState {
                key: self.key.clone(),
                reason: "file without a modification time".to_string(),
            });
        }
        Ok(())
    }

    /// Equality used by reconciliation: rounded mtime and encrypted size
    #[must_use]
    pub fn same_content_as(&self, other: &Entity, resolution: MtimeResolution) -> bool {
        self.rounded_mtime(resolution) == other.rounded_mtime(resolution)
            && self.effective_size_enc() == other.effective_size_enc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mtime_is_unknown() {
        let e = Entity::file("a.md", 0, 3);
        assert_eq!(e.mtime(), None);
        assert!(e.validate().is_err());

        let e = Entity::file("a.md", 0, 3).with_server_mtime(42);
        assert_eq!(e.mtime(), Some(42));
        assert!(e.validate().is_ok());
    }

    #[test]
    fn test_folder_invariants() {
        let f = Entity::folder("docs/");
        assert!(f.is_folder());
        assert!(f.validate().is_ok());

        let mut bad = Entity::folder("docs/");
        bad.size = 10;
        assert!(matches!(
            bad.validate(),
            Err(DomainError::AmbiguousState { .. })
        ));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(MtimeResolution::Seconds.round(1_999), 1_000);
        assert_eq!(MtimeResolution::Seconds.round(-1), -1_000);
        assert_eq!(MtimeResolution::Millis.round(1_999), 1_999);
        assert_eq!(
            MtimeResolution::Millis.coarsest(MtimeResolution::Seconds),
            MtimeResolution::Seconds
        );
    }

    #[test]
    fn test_same_content_respects_resolution() {
        let a = Entity::file("a.md", 10_100, 5);
        let b = Entity::file("a.md", 10_900, 5);
        assert!(!a.same_content_as(&b, MtimeResolution::Millis));
        assert!(a.same_content_as(&b, MtimeResolution::Seconds));
    }

    #[test]
    fn test_same_content_uses_encrypted_size() {
        let local = Entity::file("a.md", 1_000, 5).with_encrypted("xyz", 33);
        let remote = Entity::file("a.md", 1_000, 33);
        assert!(local.same_content_as(&remote, MtimeResolution::Millis));
    }

    #[test]
    fn test_serde_roundtrip_skips_empty_fields() {
        let e = Entity::file("a.md", 1_000, 5);
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("key_enc"));
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
