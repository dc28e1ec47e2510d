//! vaultsync Crypto - End-to-end encryption of a remote replica
//!
//! This crate provides:
//! - **Cipher** - Argon2id key derivation, AES-256-GCM content encryption
//!   and randomized name encryption
//! - **EncryptedStorage** - A storage wrapper that maps plain keys and
//!   content to their encrypted form and back
//!
//! The wrapper has two states. A cold [`EncryptedStorage`] can only be
//! walked; walking yields a [`WarmEncryptedStorage`] whose name cache is
//! populated, and only the warm state implements `IStorage`.

pub mod adapter;
pub mod cipher;

pub use adapter::{EncryptedStorage, NameSnapshot, WarmEncryptedStorage};
pub use cipher::{Cipher, KdfParams, ENCRYPTION_OVERHEAD, MAX_PLAIN_COMPONENT};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Stored name is not a valid encrypted name
    #[error("Invalid encrypted name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A path component whose encrypted form exceeds the file name limit
    #[error("Name '{component}' is too long to encrypt ({len} bytes, at most {max})")]
    NameTooLong {
        component: String,
        len: usize,
        max: usize,
    },
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
