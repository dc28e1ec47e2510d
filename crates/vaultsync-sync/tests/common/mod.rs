//! Shared in-memory fakes for the sync integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::bail;

use vaultsync_core::config::SyncConfig;
use vaultsync_core::domain::key::ancestor_keys;
use vaultsync_core::domain::{Entity, MtimeResolution, SyncDirection, SyncPlan};
use vaultsync_core::ports::{IPlanStore, IPrevSyncStore, IStorage, StorageError};
use vaultsync_crypto::{Cipher, KdfParams};
use vaultsync_sync::{SyncEngine, SyncProgress, SyncStep};

// ============================================================================
// MemoryStorage
// ============================================================================

#[derive(Default)]
struct MemState {
    files: BTreeMap<String, (Vec<u8>, i64)>,
    folders: BTreeSet<String>,
}

/// `IStorage` over two in-memory maps, with optional failure injection
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemState>,
    failing: Mutex<HashSet<String>>,
    resolution: MtimeResolution,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_resolution(resolution: MtimeResolution) -> Arc<Self> {
        Arc::new(Self {
            resolution,
            ..Self::default()
        })
    }

    /// Seed a file, creating its ancestor folders
    pub fn put(&self, key: &str, content: &[u8], mtime: i64) {
        let mut state = self.state.lock().unwrap();
        for folder in ancestor_keys(key) {
            state.folders.insert(folder);
        }
        state
            .files
            .insert(key.to_string(), (content.to_vec(), self.resolution.round(mtime)));
    }

    pub fn put_folder(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        for folder in ancestor_keys(key) {
            state.folders.insert(folder);
        }
        state.folders.insert(key.to_string());
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.remove(key);
        state.folders.remove(key);
    }

    /// Make every operation on `key` fail
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(key).map(|(c, _)| c.clone())
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.content(key).map(|c| String::from_utf8(c).unwrap())
    }

    pub fn mtime(&self, key: &str) -> Option<i64> {
        self.state.lock().unwrap().files.get(key).map(|(_, m)| *m)
    }

    pub fn has_folder(&self, key: &str) -> bool {
        self.state.lock().unwrap().folders.contains(key)
    }

    /// All keys, folders included, sorted
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<String> = state
            .files
            .keys()
            .chain(state.folders.iter())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn check(&self, key: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            bail!("injected failure for {key}");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IStorage for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn mtime_resolution(&self) -> MtimeResolution {
        self.resolution
    }

    async fn walk(&self) -> anyhow::Result<Vec<Entity>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<Entity> = state.folders.iter().map(Entity::folder).collect();
        out.extend(
            state
                .files
                .iter()
                .map(|(k, (c, m))| Entity::file(k.clone(), *m, c.len() as u64)),
        );
        Ok(out)
    }

    async fn stat(&self, key: &str) -> anyhow::Result<Entity> {
        let state = self.state.lock().unwrap();
        if state.folders.contains(key) {
            return Ok(Entity::folder(key));
        }
        match state.files.get(key) {
            Some((c, m)) => Ok(Entity::file(key, *m, c.len() as u64)),
            None => Err(StorageError::NotFound(key.to_string()).into()),
        }
    }

    async fn mkdir(
        &self,
        key: &str,
        _mtime: Option<i64>,
        _ctime: Option<i64>,
    ) -> anyhow::Result<Entity> {
        self.check(key)?;
        self.put_folder(key);
        Ok(Entity::folder(key))
    }

    async fn write_file(
        &self,
        key: &str,
        content: &[u8],
        mtime: i64,
        _ctime: i64,
    ) -> anyhow::Result<Entity> {
        self.check(key)?;
        self.put(key, content, mtime);
        Ok(Entity::file(key, self.resolution.round(mtime), content.len() as u64))
    }

    async fn read_file(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.check(key)?;
        self.content(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()).into())
    }

    async fn rm(&self, key: &str) -> anyhow::Result<()> {
        self.check(key)?;
        let mut state = self.state.lock().unwrap();
        if key.ends_with('/') {
            if !state.folders.contains(key) {
                return Err(StorageError::NotFound(key.to_string()).into());
            }
            let occupied = state.files.keys().any(|k| k.starts_with(key))
                || state.folders.iter().any(|k| k != key && k.starts_with(key));
            if occupied {
                bail!("folder {key} is not empty");
            }
            state.folders.remove(key);
        } else if state.files.remove(key).is_none() {
            return Err(StorageError::NotFound(key.to_string()).into());
        }
        Ok(())
    }
}

// ============================================================================
// MemoryPrevSync / MemoryPlanStore
// ============================================================================

type RecordKey = (String, String, String);

#[derive(Default)]
pub struct MemoryPrevSync {
    records: Mutex<HashMap<RecordKey, Entity>>,
    contents: Mutex<HashMap<RecordKey, Vec<u8>>>,
}

impl MemoryPrevSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .keys()
            .map(|(_, _, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn record(&self, vault: &str, profile: &str, key: &str) -> Option<Entity> {
        self.records
            .lock()
            .unwrap()
            .get(&(vault.to_string(), profile.to_string(), key.to_string()))
            .cloned()
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap()
            .iter()
            .find(|((_, _, k), _)| k == key)
            .map(|(_, c)| c.clone())
    }

    pub fn has_content(&self, key: &str) -> bool {
        self.contents
            .lock()
            .unwrap()
            .keys()
            .any(|(_, _, k)| k == key)
    }
}

fn rk(vault: &str, profile: &str, key: &str) -> RecordKey {
    (vault.to_string(), profile.to_string(), key.to_string())
}

#[async_trait::async_trait]
impl IPrevSyncStore for MemoryPrevSync {
    async fn upsert(&self, vault: &str, profile: &str, entity: &Entity) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(rk(vault, profile, &entity.key), entity.clone());
        Ok(())
    }

    async fn clear(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()> {
        self.records.lock().unwrap().remove(&rk(vault, profile, key));
        self.contents.lock().unwrap().remove(&rk(vault, profile, key));
        Ok(())
    }

    async fn get_all(&self, vault: &str, profile: &str) -> anyhow::Result<Vec<Entity>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|((v, p, _), _)| v == vault && p == profile)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn upsert_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
        content: &[u8],
    ) -> anyhow::Result<()> {
        self.contents
            .lock()
            .unwrap()
            .insert(rk(vault, profile, key), content.to_vec());
        Ok(())
    }

    async fn clear_content(&self, vault: &str, profile: &str, key: &str) -> anyhow::Result<()> {
        self.contents.lock().unwrap().remove(&rk(vault, profile, key));
        Ok(())
    }

    async fn get_content(
        &self,
        vault: &str,
        profile: &str,
        key: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .contents
            .lock()
            .unwrap()
            .get(&rk(vault, profile, key))
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<Vec<SyncPlan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl IPlanStore for MemoryPlanStore {
    async fn save_plan(&self, _vault: &str, _profile: &str, plan: &SyncPlan) -> anyhow::Result<()> {
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn latest_plan(&self, _vault: &str, _profile: &str) -> anyhow::Result<Option<SyncPlan>> {
        Ok(self.plans.lock().unwrap().last().cloned())
    }
}

// ============================================================================
// Progress recorder
// ============================================================================

#[derive(Default)]
pub struct RecordingProgress {
    pub steps: Mutex<Vec<SyncStep>>,
    pub tasks: Mutex<usize>,
}

impl SyncProgress for RecordingProgress {
    fn on_step(&self, step: SyncStep) {
        self.steps.lock().unwrap().push(step);
    }

    fn on_task(&self, _index: usize, _total: usize, _key: &str, _decision: vaultsync_core::domain::Decision) {
        *self.tasks.lock().unwrap() += 1;
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const VAULT: &str = "vault";
pub const PROFILE: &str = "default";

pub struct Harness {
    pub local: Arc<MemoryStorage>,
    pub remote: Arc<MemoryStorage>,
    pub prev: Arc<MemoryPrevSync>,
    pub plans: Arc<MemoryPlanStore>,
    pub cipher: Option<Cipher>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            local: MemoryStorage::new(),
            remote: MemoryStorage::new(),
            prev: MemoryPrevSync::new(),
            plans: MemoryPlanStore::new(),
            cipher: None,
        }
    }

    pub fn encrypted(password: &str) -> Self {
        let params = KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        };
        Self {
            cipher: Some(Cipher::from_password_with_params(password, &params).unwrap()),
            ..Self::new()
        }
    }

    pub fn engine(&self, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(
            self.local.clone(),
            self.remote.clone(),
            self.cipher.clone(),
            self.prev.clone(),
            config,
        )
        .unwrap()
        .with_plan_store(self.plans.clone())
    }
}

pub fn config() -> SyncConfig {
    SyncConfig {
        vault_id: VAULT.to_string(),
        profile_id: PROFILE.to_string(),
        ..SyncConfig::default()
    }
}

pub fn config_with(direction: SyncDirection) -> SyncConfig {
    SyncConfig {
        direction,
        ..config()
    }
}
