//! Path key helpers
//!
//! A key is the normalized, decrypted path of an entry relative to the
//! replica root. Separators are always `/`, there is no leading `/`, and
//! folder keys end with `/`. The root folder itself is the key `"/"`.

use super::errors::DomainError;

/// Key of the implicit root folder
pub const ROOT_KEY: &str = "/";

/// Returns true if the key denotes a folder
#[must_use]
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Normalize a storage-native path into a key
///
/// Backslashes become `/`, leading `/` and `./` segments are stripped and
/// repeated separators collapse. A trailing separator is preserved so the
/// caller decides whether the path is a folder.
///
/// # Errors
/// Returns `DomainError::InvalidKey` for empty paths and for paths that
/// contain `.` or `..` segments.
pub fn normalize_key(raw: &str) -> Result<String, DomainError> {
    let unified = raw.replace('\\', "/");
    let folder = unified.ends_with('/');

    let mut parts = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" => continue,
            "." if parts.is_empty() => continue,
            "." | ".." => return Err(DomainError::InvalidKey(raw.to_string())),
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return Err(DomainError::InvalidKey(raw.to_string()));
    }

    let mut key = parts.join("/");
    if folder {
        key.push('/');
    }
    Ok(key)
}

/// Parent folder key of a key
///
/// `"a/b/c.md"` gives `"a/b/"`, `"a/"` gives `"/"`, and top-level entries
/// give the root key.
#[must_use]
pub fn parent_key(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => ROOT_KEY.to_string(),
    }
}

/// Number of path components in a key (root is 0)
#[must_use]
pub fn key_depth(key: &str) -> usize {
    let trimmed = key.trim_matches('/');
    if trimmed.is_empty() {
        0
    } else {
        trimmed.split('/').count()
    }
}

/// Folder keys of all ancestors, shallowest first, root excluded
#[must_use]
pub fn ancestor_keys(key: &str) -> Vec<String> {
    let trimmed = key.trim_end_matches('/');
    let mut out = Vec::new();
    for (idx, ch) in trimmed.char_indices() {
        if ch == '/' {
            out.push(trimmed[..=idx].to_string());
        }
    }
    out
}

/// Last component of a key, without the folder suffix
#[must_use]
pub fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("a/b.md").unwrap(), "a/b.md");
        assert_eq!(normalize_key("/a//b.md").unwrap(), "a/b.md");
        assert_eq!(normalize_key("./a/").unwrap(), "a/");
        assert_eq!(normalize_key("a\\b\\c.md").unwrap(), "a/b/c.md");
    }

    #[test]
    fn test_normalize_key_rejects_bad_paths() {
        assert!(normalize_key("").is_err());
        assert!(normalize_key("/").is_err());
        assert!(normalize_key("a/../b").is_err());
        assert!(normalize_key("a/./b").is_err());
    }

    #[test]
    fn test_parent_key() {
        assert_eq!(parent_key("a/b/c.md"), "a/b/");
        assert_eq!(parent_key("a/b/"), "a/");
        assert_eq!(parent_key("a/"), "/");
        assert_eq!(parent_key("note.md"), "/");
    }

    #[test]
    fn test_key_depth() {
        assert_eq!(key_depth("/"), 0);
        assert_eq!(key_depth("a/"), 1);
        assert_eq!(key_depth("a/b.md"), 2);
        assert_eq!(key_depth("a/b/c/"), 3);
    }

    #[test]
    fn test_ancestor_keys() {
        assert_eq!(ancestor_keys("a/b/c.md"), vec!["a/", "a/b/"]);
        assert_eq!(ancestor_keys("a/b/"), vec!["a/"]);
        assert!(ancestor_keys("top.md").is_empty());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.md"), "c.md");
        assert_eq!(base_name("a/b/"), "b");
        assert_eq!(base_name("x"), "x");
    }
}
