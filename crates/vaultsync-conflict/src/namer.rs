//! Conflict naming for duplicate-on-conflict resolution
//!
//! A conflict copy gets `.dup` inserted before the last extension of its
//! base name: `notes/a.md` becomes `notes/a.dup.md`. Names without an
//! extension, and dotfiles whose only dot is the leading one, get `.dup`
//! appended.

use crate::error::ConflictError;

const DUP_SUFFIX: &str = ".dup";

/// Upper bound on repeated suffixing
const MAX_ATTEMPTS: usize = 64;

/// Generates conflict copy names
pub struct ConflictNamer;

impl ConflictNamer {
    /// Insert `.dup` into a file key
    ///
    /// # Errors
    /// Folder keys and empty, `.` or `..` base names are rejected.
    pub fn dup_name(key: &str) -> Result<String, ConflictError> {
        if key.ends_with('/') {
            return Err(ConflictError::InvalidName(key.to_string()));
        }

        let (dir, base) = match key.rfind('/') {
            Some(idx) => key.split_at(idx + 1),
            None => ("", key),
        };
        if base.is_empty() || base == "." || base == ".." {
            return Err(ConflictError::InvalidName(key.to_string()));
        }

        let renamed = match base.rfind('.') {
            Some(dot) if dot > 0 => {
                let (stem, ext) = base.split_at(dot);
                format!("{stem}{DUP_SUFFIX}{ext}")
            }
            _ => format!("{base}{DUP_SUFFIX}"),
        };
        Ok(format!("{dir}{renamed}"))
    }

    /// Apply `.dup` repeatedly until `exists` reports a free name
    pub fn generate_unique<F>(key: &str, mut exists: F) -> Result<String, ConflictError>
    where
        F: FnMut(&str) -> bool,
    {
        let mut candidate = Self::dup_name(key)?;
        for _ in 0..MAX_ATTEMPTS {
            if !exists(&candidate) {
                return Ok(candidate);
            }
            candidate = Self::dup_name(&candidate)?;
        }
        Err(ConflictError::NamesExhausted(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dup_name_law() {
        assert_eq!(ConflictNamer::dup_name("abc").unwrap(), "abc.dup");
        assert_eq!(ConflictNamer::dup_name("abc.efg").unwrap(), "abc.dup.efg");
        assert_eq!(
            ConflictNamer::dup_name("xxxx/yyyy/abc.tar.gz").unwrap(),
            "xxxx/yyyy/abc.tar.dup.gz"
        );
        assert_eq!(ConflictNamer::dup_name(".abc").unwrap(), ".abc.dup");
        assert_eq!(ConflictNamer::dup_name("abc.dup").unwrap(), "abc.dup.dup");
    }

    #[test]
    fn test_dup_name_rejects() {
        for bad in ["", ".", "..", "/", "folder/", "a/b/"] {
            assert!(
                matches!(
                    ConflictNamer::dup_name(bad),
                    Err(ConflictError::InvalidName(_))
                ),
                "{bad:?} accepted"
            );
        }
        assert!(ConflictNamer::dup_name("a/..").is_err());
    }

    #[test]
    fn test_dotfile_in_folder() {
        assert_eq!(
            ConflictNamer::dup_name("cfg/.gitignore").unwrap(),
            "cfg/.gitignore.dup"
        );
    }

    #[test]
    fn test_generate_unique_no_collision() {
        let name = ConflictNamer::generate_unique("n.md", |_| false).unwrap();
        assert_eq!(name, "n.dup.md");
    }

    #[test]
    fn test_generate_unique_with_collision() {
        let taken = ["n.dup.md", "n.dup.dup.md"];
        let name = ConflictNamer::generate_unique("n.md", |c| taken.contains(&c)).unwrap();
        assert_eq!(name, "n.dup.dup.dup.md");
    }

    #[test]
    fn test_generate_unique_gives_up() {
        let result = ConflictNamer::generate_unique("n.md", |_| true);
        assert!(matches!(result, Err(ConflictError::NamesExhausted(_))));
    }
}
