//! Encrypted storage adapter
//!
//! Wraps an `IStorage` holding encrypted names and content and exposes it
//! with plain keys and content. Name encryption is randomized, so the
//! mapping between plain and encrypted names is only learned by listing
//! the inner storage. That listing is what turns a cold
//! [`EncryptedStorage`] into a [`WarmEncryptedStorage`].
//!
//! Names are encrypted per path component. A new key reuses the encrypted
//! names its ancestor folders already have, so children land inside their
//! parent folder on the inner storage.
//!
//! With no password the adapter is a passthrough: keys and content are
//! forwarded unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use vaultsync_core::domain::key::{ancestor_keys, base_name};
use vaultsync_core::domain::{Entity, MtimeResolution};
use vaultsync_core::ports::{IStorage, StorageError};

use crate::cipher::{encrypted_size, plain_size, Cipher};

// ============================================================================
// NameSnapshot
// ============================================================================

/// Point-in-time copy of the plain to encrypted name mapping
///
/// Used to annotate local entities with the encrypted name and size they
/// have (or will have) on the remote side.
#[derive(Debug, Clone, Default)]
pub struct NameSnapshot {
    encrypted: bool,
    names: HashMap<String, String>,
}

impl NameSnapshot {
    /// Snapshot for an unencrypted remote
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Encrypted name of a plain key, if the remote already has one
    #[must_use]
    pub fn encrypted_name(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    /// Fill `key_enc` and `size_enc` of a local entity
    #[must_use]
    pub fn annotate(&self, mut entity: Entity) -> Entity {
        if self.encrypted {
            entity.key_enc = self.names.get(&entity.key).cloned();
            entity.size_enc = Some(if entity.is_folder() {
                0
            } else {
                encrypted_size(entity.size)
            });
        } else {
            entity.key_enc = Some(entity.key.clone());
            entity.size_enc = Some(entity.size);
        }
        entity
    }
}

// ============================================================================
// Cold state
// ============================================================================

/// Encrypted storage before its name cache exists
///
/// The only available operation is [`EncryptedStorage::walk`], which
/// consumes the cold adapter and returns the warm one.
pub struct EncryptedStorage {
    inner: Arc<dyn IStorage>,
    cipher: Option<Arc<Cipher>>,
}

impl EncryptedStorage {
    /// Wrap a storage; an empty password makes the adapter a passthrough
    pub fn new(inner: Arc<dyn IStorage>, password: &str) -> crate::Result<Self> {
        let cipher = if password.is_empty() {
            None
        } else {
            Some(Cipher::from_password(password)?)
        };
        Ok(Self::with_cipher(inner, cipher))
    }

    /// Wrap a storage with already derived keys
    pub fn with_cipher(inner: Arc<dyn IStorage>, cipher: Option<Cipher>) -> Self {
        Self {
            inner,
            cipher: cipher.map(Arc::new),
        }
    }

    /// True when no password is configured
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.cipher.is_none()
    }

    /// List the inner storage, build the name cache and warm up
    pub async fn walk(self) -> anyhow::Result<(WarmEncryptedStorage, Vec<Entity>)> {
        let warm = WarmEncryptedStorage {
            inner: self.inner,
            cipher: self.cipher,
            cache: RwLock::new(NameCache::default()),
        };
        let entities = warm.walk_and_cache().await?;
        Ok((warm, entities))
    }
}

// ============================================================================
// Warm state
// ============================================================================

#[derive(Debug, Default)]
struct NameCache {
    plain_to_enc: HashMap<String, String>,
    enc_to_plain: HashMap<String, String>,
}

impl NameCache {
    fn insert(&mut self, plain: String, enc: String) {
        self.enc_to_plain.insert(enc.clone(), plain.clone());
        self.plain_to_enc.insert(plain, enc);
    }

    fn remove(&mut self, plain: &str) {
        if let Some(enc) = self.plain_to_enc.remove(plain) {
            self.enc_to_plain.remove(&enc);
        }
    }
}

/// Encrypted storage with a populated name cache
pub struct WarmEncryptedStorage {
    inner: Arc<dyn IStorage>,
    cipher: Option<Arc<Cipher>>,
    cache: RwLock<NameCache>,
}

impl WarmEncryptedStorage {
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.cipher.is_none()
    }

    /// Copy of the current name mapping
    pub async fn name_snapshot(&self) -> NameSnapshot {
        match self.cipher {
            None => NameSnapshot::passthrough(),
            Some(_) => NameSnapshot {
                encrypted: true,
                names: self.cache.read().await.plain_to_enc.clone(),
            },
        }
    }

    async fn walk_and_cache(&self) -> anyhow::Result<Vec<Entity>> {
        let raw = self.inner.walk().await?;
        let Some(cipher) = &self.cipher else {
            return Ok(raw.into_iter().map(passthrough_entity).collect());
        };

        let mut cache = NameCache::default();
        let mut out = Vec::with_capacity(raw.len());
        for entity in raw {
            let plain = match cipher.decrypt_name(&entity.key) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!(name = %entity.key, error = %e, "Skipping undecryptable remote entry");
                    continue;
                }
            };
            cache.insert(plain.clone(), entity.key.clone());
            out.push(decrypted_entity(plain, entity));
        }

        debug!(entries = out.len(), "Encrypted name cache populated");
        *self.cache.write().await = cache;
        Ok(out)
    }

    /// Encrypted name of a known key
    async fn existing_name(&self, key: &str) -> anyhow::Result<String> {
        if self.cipher.is_none() {
            return Ok(key.to_string());
        }
        self.cache
            .read()
            .await
            .plain_to_enc
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()).into())
    }

    /// Encrypted name of a key, allocating a fresh one if unknown
    ///
    /// Unknown ancestor folders get their names allocated on the way down.
    async fn name_for_write(&self, key: &str) -> anyhow::Result<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(key.to_string());
        };
        let mut cache = self.cache.write().await;
        if let Some(enc) = cache.plain_to_enc.get(key) {
            return Ok(enc.clone());
        }

        let mut prefixes = ancestor_keys(key);
        prefixes.push(key.to_string());

        let mut enc = String::new();
        for prefix in prefixes {
            if let Some(known) = cache.plain_to_enc.get(&prefix) {
                enc = known.clone();
                continue;
            }
            let component = cipher.encrypt_component(base_name(&prefix))?;
            enc = format!("{enc}{component}");
            if prefix.ends_with('/') {
                enc.push('/');
            }
            cache.insert(prefix, enc.clone());
        }
        Ok(enc)
    }

    fn map_back(&self, plain: &str, entity: Entity) -> Entity {
        match self.cipher {
            None => passthrough_entity(entity),
            Some(_) => decrypted_entity(plain.to_string(), entity),
        }
    }
}

fn passthrough_entity(mut entity: Entity) -> Entity {
    entity.key_enc = Some(entity.key.clone());
    entity.size_enc = Some(entity.size);
    entity
}

fn decrypted_entity(plain: String, raw: Entity) -> Entity {
    let folder = plain.ends_with('/');
    let size = if folder {
        0
    } else {
        plain_size(raw.size).unwrap_or(0)
    };
    Entity {
        key: plain,
        key_raw: raw.key_raw,
        key_enc: Some(raw.key),
        mtime_cli: raw.mtime_cli,
        mtime_svr: raw.mtime_svr,
        size,
        size_raw: raw.size_raw,
        size_enc: Some(raw.size),
        hash: raw.hash,
        etag: raw.etag,
        synthesized_folder: raw.synthesized_folder,
    }
}

#[async_trait::async_trait]
impl IStorage for WarmEncryptedStorage {
    fn kind(&self) -> &'static str {
        if self.cipher.is_some() {
            "encrypted"
        } else {
            self.inner.kind()
        }
    }

    fn mtime_resolution(&self) -> MtimeResolution {
        self.inner.mtime_resolution()
    }

    async fn walk(&self) -> anyhow::Result<Vec<Entity>> {
        self.walk_and_cache().await
    }

    async fn stat(&self, key: &str) -> anyhow::Result<Entity> {
        let enc = self.existing_name(key).await?;
        let entity = self.inner.stat(&enc).await?;
        Ok(self.map_back(key, entity))
    }

    async fn mkdir(
        &self,
        key: &str,
        mtime: Option<i64>,
        ctime: Option<i64>,
    ) -> anyhow::Result<Entity> {
        let enc = self.name_for_write(key).await?;
        let entity = self.inner.mkdir(&enc, mtime, ctime).await?;
        Ok(self.map_back(key, entity))
    }

    async fn write_file(
        &self,
        key: &str,
        content: &[u8],
        mtime: i64,
        ctime: i64,
    ) -> anyhow::Result<Entity> {
        let enc = self.name_for_write(key).await?;
        let entity = match &self.cipher {
            None => self.inner.write_file(&enc, content, mtime, ctime).await?,
            Some(cipher) => {
                let sealed = cipher.encrypt_content(content)?;
                self.inner.write_file(&enc, &sealed, mtime, ctime).await?
            }
        };
        Ok(self.map_back(key, entity))
    }

    async fn read_file(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let enc = self.existing_name(key).await?;
        let data = self.inner.read_file(&enc).await?;
        match &self.cipher {
            None => Ok(data),
            Some(cipher) => Ok(cipher.decrypt_content(&data)?),
        }
    }

    async fn rm(&self, key: &str) -> anyhow::Result<()> {
        let enc = self.existing_name(key).await?;
        self.inner.rm(&enc).await?;
        if self.cipher.is_some() {
            self.cache.write().await.remove(key);
        }
        Ok(())
    }
}
