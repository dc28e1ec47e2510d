//! Domain error types
//!
//! Errors raised while building or validating domain values: malformed
//! keys, entities that violate their invariants, and plan lookups.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Key is empty, escapes the root, or is otherwise malformed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// An entity violates a structural invariant
    #[error("Ambiguous state for '{key}': {reason}")]
    AmbiguousState {
        /// The offending key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// Unknown enum value in configuration or persisted data
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Which vocabulary was parsed
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidKey("../x".to_string());
        assert_eq!(err.to_string(), "Invalid key: ../x");

        let err = DomainError::AmbiguousState {
            key: "a.md".to_string(),
            reason: "no modification time".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous state for 'a.md': no modification time"
        );

        let err = DomainError::UnknownVariant {
            kind: "decision",
            value: "yolo".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown decision: yolo");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidKey("a".to_string());
        let err2 = DomainError::InvalidKey("a".to_string());
        let err3 = DomainError::InvalidKey("b".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
