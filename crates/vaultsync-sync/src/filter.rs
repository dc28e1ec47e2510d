//! Key exclusion rules
//!
//! A key is excluded when it, or any of its ancestor folders, matches one
//! of the configured ignore globs, or when dot paths are not allowed and
//! any component starts with `.`. Checking ancestors means an included
//! key never has an excluded parent.

use glob::Pattern;
use tracing::debug;

use vaultsync_core::config::SyncConfig;
use vaultsync_core::domain::key::ancestor_keys;

use crate::SyncError;

/// Compiled exclusion rules
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<Pattern>,
    allow_dot_paths: bool,
}

impl PathFilter {
    /// Compile ignore patterns
    ///
    /// # Errors
    /// Returns `SyncError::InvalidPattern` for the first malformed glob.
    pub fn new(patterns: &[String], allow_dot_paths: bool) -> Result<Self, SyncError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| SyncError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(patterns = compiled.len(), allow_dot_paths, "PathFilter initialized");

        Ok(Self {
            patterns: compiled,
            allow_dot_paths,
        })
    }

    /// Build from the sync section of the configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(&config.ignore_paths, config.allow_dot_paths)
    }

    /// Filter that only excludes dot paths
    #[must_use]
    pub fn dot_paths_only() -> Self {
        Self::default()
    }

    /// Filter that excludes nothing
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
            allow_dot_paths: true,
        }
    }

    /// True if the key must be left out of the plan
    #[must_use]
    pub fn is_excluded(&self, key: &str) -> bool {
        if !self.allow_dot_paths && key.split('/').any(|c| c.starts_with('.')) {
            return true;
        }
        if self.patterns.is_empty() {
            return false;
        }
        ancestor_keys(key)
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(key))
            .any(|k| self.matches(k))
    }

    fn matches(&self, key: &str) -> bool {
        let bare = key.trim_end_matches('/');
        self.patterns
            .iter()
            .any(|p| p.matches(key) || p.matches(bare))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str], dots: bool) -> PathFilter {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PathFilter::new(&owned, dots).unwrap()
    }

    #[test]
    fn test_dot_paths_excluded_by_default() {
        let f = PathFilter::dot_paths_only();
        assert!(f.is_excluded(".obsidian/"));
        assert!(f.is_excluded(".obsidian/workspace.json"));
        assert!(f.is_excluded("notes/.hidden.md"));
        assert!(!f.is_excluded("notes/visible.md"));
    }

    #[test]
    fn test_dot_paths_allowed() {
        let f = PathFilter::allow_all();
        assert!(!f.is_excluded(".obsidian/workspace.json"));
    }

    #[test]
    fn test_glob_matches_file() {
        let f = filter(&["*.tmp"], false);
        assert!(f.is_excluded("scratch.tmp"));
        assert!(f.is_excluded("deep/dir/scratch.tmp"));
        assert!(!f.is_excluded("scratch.md"));
    }

    #[test]
    fn test_excluded_folder_excludes_descendants() {
        let f = filter(&["archive"], false);
        assert!(f.is_excluded("archive/"));
        assert!(f.is_excluded("archive/2020/old.md"));
        assert!(!f.is_excluded("archived.md"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = PathFilter::new(&["[oops".to_string()], false);
        assert!(matches!(result, Err(SyncError::InvalidPattern { .. })));
    }
}
