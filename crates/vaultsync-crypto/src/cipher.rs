//! Key derivation and AES-256-GCM encryption of names and content.
//!
//! A password is stretched with Argon2id into a master key, from which two
//! independent subkeys are derived with SHA-256: one for file names, one
//! for file content.
//!
//! Encrypted content layout: `nonce (12) || ciphertext || tag (16)`.
//! Names are encrypted one path component at a time with the same layout,
//! base64url encoded without padding, so the remote keeps the folder
//! structure and every stored component stays within [`NAME_MAX`]. Folder
//! names keep their trailing `/`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Bytes added to every encrypted payload (nonce + tag)
pub const ENCRYPTION_OVERHEAD: u64 = 28;

/// Longest stored name component common file systems accept
pub const NAME_MAX: usize = 255;

/// Longest plain component whose encrypted form fits in [`NAME_MAX`]
pub const MAX_PLAIN_COMPONENT: usize = NAME_MAX * 3 / 4 - ENCRYPTION_OVERHEAD as usize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Fixed application salt; the password alone identifies the keys
const KDF_SALT: &[u8] = b"vaultsync/kdf/v1";

const NAME_KEY_LABEL: &[u8] = b"vaultsync/name";
const CONTENT_KEY_LABEL: &[u8] = b"vaultsync/content";

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost_kib: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Number of lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 19_456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Derived name and content keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Cipher {
    name_key: [u8; 32],
    content_key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher { .. }")
    }
}

impl Cipher {
    /// Derive keys from a password with default cost parameters
    pub fn from_password(password: &str) -> Result<Self> {
        Self::from_password_with_params(password, &KdfParams::default())
    }

    /// Derive keys from a password with explicit cost parameters
    pub fn from_password_with_params(password: &str, params: &KdfParams) -> Result<Self> {
        if password.is_empty() {
            return Err(CryptoError::KdfFailed("password is empty".to_string()));
        }

        let argon_params = Params::new(
            params.mem_cost_kib,
            params.time_cost,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut master = [0u8; 32];
        argon2
            .hash_password_into(password.as_bytes(), KDF_SALT, &mut master)
            .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {e}")))?;

        let cipher = Self {
            name_key: subkey(&master, NAME_KEY_LABEL),
            content_key: subkey(&master, CONTENT_KEY_LABEL),
        };
        master.zeroize();
        Ok(cipher)
    }

    /// Encrypt file content
    pub fn encrypt_content(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        seal(&self.content_key, plaintext)
    }

    /// Decrypt file content
    pub fn decrypt_content(&self, data: &[u8]) -> Result<Vec<u8>> {
        open(&self.content_key, data)
    }

    /// Encrypt a plain key into a storage name, component by component
    ///
    /// The result differs on every call because the nonce is random.
    pub fn encrypt_name(&self, key: &str) -> Result<String> {
        let (body, folder) = split_folder(key);
        let mut name = body
            .split('/')
            .map(|component| self.encrypt_component(component))
            .collect::<Result<Vec<_>>>()?
            .join("/");
        if folder {
            name.push('/');
        }
        Ok(name)
    }

    /// Encrypt a single path component
    ///
    /// # Errors
    /// Empty components, components containing `/` and components longer
    /// than [`MAX_PLAIN_COMPONENT`] bytes are rejected.
    pub fn encrypt_component(&self, component: &str) -> Result<String> {
        if component.is_empty() || component.contains('/') {
            return Err(CryptoError::EncryptionFailed(format!(
                "invalid name component '{component}'"
            )));
        }
        if component.len() > MAX_PLAIN_COMPONENT {
            return Err(CryptoError::NameTooLong {
                component: component.to_string(),
                len: component.len(),
                max: MAX_PLAIN_COMPONENT,
            });
        }
        let sealed = seal(&self.name_key, component.as_bytes())?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decrypt a storage name back into its plain key
    pub fn decrypt_name(&self, name: &str) -> Result<String> {
        let (body, folder) = split_folder(name);
        let mut key = body
            .split('/')
            .map(|component| self.decrypt_component(name, component))
            .collect::<Result<Vec<_>>>()?
            .join("/");
        if folder {
            key.push('/');
        }
        Ok(key)
    }

    fn decrypt_component(&self, name: &str, component: &str) -> Result<String> {
        let invalid = |reason: String| CryptoError::InvalidName {
            name: name.to_string(),
            reason,
        };
        let sealed = URL_SAFE_NO_PAD
            .decode(component)
            .map_err(|e| invalid(e.to_string()))?;
        let plain = open(&self.name_key, &sealed).map_err(|e| invalid(e.to_string()))?;
        let plain = String::from_utf8(plain).map_err(|e| invalid(e.to_string()))?;
        if plain.is_empty() || plain.contains('/') {
            return Err(invalid(format!("component decrypts to '{plain}'")));
        }
        Ok(plain)
    }
}

/// Size of the encrypted form of `plain` bytes
#[must_use]
pub fn encrypted_size(plain: u64) -> u64 {
    plain + ENCRYPTION_OVERHEAD
}

/// Size of the plain form of an encrypted payload, if it is large enough
#[must_use]
pub fn plain_size(encrypted: u64) -> Option<u64> {
    encrypted.checked_sub(ENCRYPTION_OVERHEAD)
}

fn subkey(master: &[u8; 32], label: &[u8]) -> [u8; 32] {
    Sha256::new()
        .chain_update(master)
        .chain_update(label)
        .finalize()
        .into()
}

fn split_folder(key: &str) -> (&str, bool) {
    match key.strip_suffix('/') {
        Some(body) => (body, true),
        None => (key, false),
    }
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // AES-GCM appends the auth tag to the ciphertext
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "payload too short: {} bytes",
            data.len()
        )));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CryptoError::DecryptionFailed("authentication failed, wrong password or tampered data".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn cipher(password: &str) -> Cipher {
        Cipher::from_password_with_params(password, &fast_params()).unwrap()
    }

    #[test]
    fn test_content_roundtrip_and_overhead() {
        let c = cipher("secret");
        let plain = b"# Title\n\nbody\n";
        let enc = c.encrypt_content(plain).unwrap();
        assert_eq!(enc.len() as u64, encrypted_size(plain.len() as u64));
        assert_eq!(c.decrypt_content(&enc).unwrap(), plain);
    }

    #[test]
    fn test_empty_content_is_encryptable() {
        let c = cipher("secret");
        let enc = c.encrypt_content(b"").unwrap();
        assert_eq!(enc.len() as u64, ENCRYPTION_OVERHEAD);
        assert!(c.decrypt_content(&enc).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_password_fails() {
        let enc = cipher("secret").encrypt_content(b"data").unwrap();
        let result = cipher("other").decrypt_content(&enc);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_same_password_same_keys() {
        let enc = cipher("secret").encrypt_name("a/b.md").unwrap();
        assert_eq!(cipher("secret").decrypt_name(&enc).unwrap(), "a/b.md");
    }

    #[test]
    fn test_name_is_randomized() {
        let c = cipher("secret");
        let a = c.encrypt_name("note.md").unwrap();
        let b = c.encrypt_name("note.md").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains('/'));
        assert!(!a.contains('='));
    }

    #[test]
    fn test_folder_name_keeps_structure_and_slash() {
        let c = cipher("secret");
        let enc = c.encrypt_name("docs/sub/").unwrap();
        assert!(enc.ends_with('/'));
        assert_eq!(enc.matches('/').count(), 2);
        assert_eq!(c.decrypt_name(&enc).unwrap(), "docs/sub/");
    }

    #[test]
    fn test_long_key_components_fit_name_max() {
        let c = cipher("secret");
        let key = format!("projects/2026/{}.md", "a".repeat(160));
        assert!(key.len() > 170);

        let enc = c.encrypt_name(&key).unwrap();
        let components: Vec<&str> = enc.split('/').collect();
        assert_eq!(components.len(), 3);
        assert!(components.iter().all(|part| part.len() <= NAME_MAX));
        assert_eq!(components[2].len(), NAME_MAX);
        assert_eq!(c.decrypt_name(&enc).unwrap(), key);
    }

    #[test]
    fn test_over_long_component_rejected() {
        let c = cipher("secret");
        let name = "b".repeat(MAX_PLAIN_COMPONENT + 1);
        assert!(matches!(
            c.encrypt_name(&format!("dir/{name}")),
            Err(CryptoError::NameTooLong { max: MAX_PLAIN_COMPONENT, .. })
        ));
        assert!(c.encrypt_component(&"b".repeat(MAX_PLAIN_COMPONENT)).is_ok());
    }

    #[test]
    fn test_components_decrypt_independently() {
        let c = cipher("secret");
        let parent = c.encrypt_name("docs/").unwrap();
        let child = format!("{parent}{}", c.encrypt_component("a.md").unwrap());
        assert_eq!(c.decrypt_name(&child).unwrap(), "docs/a.md");
    }

    #[test]
    fn test_garbage_name_rejected() {
        let c = cipher("secret");
        assert!(matches!(
            c.decrypt_name("not-encrypted.md"),
            Err(CryptoError::InvalidName { .. })
        ));
        let valid = c.encrypt_name("a.md").unwrap();
        assert!(matches!(
            c.decrypt_name(&format!("{valid}/plain.md")),
            Err(CryptoError::InvalidName { .. })
        ));
        assert!(c.encrypt_name("/").is_err());
        assert!(c.encrypt_name("a//b.md").is_err());
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(Cipher::from_password_with_params("", &fast_params()).is_err());
    }

    #[test]
    fn test_plain_size() {
        assert_eq!(plain_size(28), Some(0));
        assert_eq!(plain_size(100), Some(72));
        assert_eq!(plain_size(5), None);
    }
}
