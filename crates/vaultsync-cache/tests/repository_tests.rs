//! Integration tests for SqliteStateStore
//!
//! Every test works on a fresh in-memory database.

use std::collections::BTreeMap;

use vaultsync_cache::{DatabasePool, SqliteStateStore};
use vaultsync_core::domain::{
    Decision, Entity, MixedEntity, PlanSettings, SyncPlan, TriggerSource,
};
use vaultsync_core::ports::{IPlanStore, IPrevSyncStore};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteStateStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteStateStore::new(pool.pool().clone())
}

fn plan_with(keys: &[(&str, Decision)], trigger: TriggerSource) -> SyncPlan {
    let mut entries = BTreeMap::new();
    for (key, decision) in keys {
        let mut entry = MixedEntity::new(*key);
        entry.local = Some(Entity::file(*key, 1_000, 3));
        entry.decide(*decision, 42);
        entries.insert((*key).to_string(), entry);
    }
    SyncPlan::new(entries, trigger, PlanSettings::default())
}

// ============================================================================
// Previous-sync records
// ============================================================================

#[tokio::test]
async fn test_upsert_and_get_all() {
    let store = setup().await;
    let a = Entity::file("a.md", 1_000, 3).with_encrypted("ENC_A", 31);
    let folder = Entity::folder("notes/");

    store.upsert("v", "p", &a).await.unwrap();
    store.upsert("v", "p", &folder).await.unwrap();

    let all = store.get_all("v", "p").await.unwrap();
    assert_eq!(all, vec![a, folder]);
}

#[tokio::test]
async fn test_upsert_replaces_record() {
    let store = setup().await;
    store
        .upsert("v", "p", &Entity::file("a.md", 1_000, 3))
        .await
        .unwrap();
    store
        .upsert("v", "p", &Entity::file("a.md", 2_000, 5))
        .await
        .unwrap();

    let all = store.get_all("v", "p").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].mtime(), Some(2_000));
    assert_eq!(all[0].size, 5);
}

#[tokio::test]
async fn test_records_are_scoped_by_vault_and_profile() {
    let store = setup().await;
    store
        .upsert("v1", "p", &Entity::file("a.md", 1_000, 3))
        .await
        .unwrap();
    store
        .upsert("v2", "p", &Entity::file("b.md", 1_000, 3))
        .await
        .unwrap();
    store
        .upsert("v1", "other", &Entity::file("c.md", 1_000, 3))
        .await
        .unwrap();

    let keys: Vec<String> = store
        .get_all("v1", "p")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, vec!["a.md"]);
    assert_eq!(store.count_records("v1", "other").await.unwrap(), 1);
}

#[tokio::test]
async fn test_content_survives_record_update_and_is_cleared() {
    let store = setup().await;
    store
        .upsert("v", "p", &Entity::file("n.md", 1_000, 5))
        .await
        .unwrap();
    store
        .upsert_content("v", "p", "n.md", b"hello")
        .await
        .unwrap();

    store
        .upsert("v", "p", &Entity::file("n.md", 2_000, 5))
        .await
        .unwrap();
    assert_eq!(
        store.get_content("v", "p", "n.md").await.unwrap(),
        Some(b"hello".to_vec())
    );

    store.clear("v", "p", "n.md").await.unwrap();
    assert!(store.get_all("v", "p").await.unwrap().is_empty());
    assert_eq!(store.get_content("v", "p", "n.md").await.unwrap(), None);
}

#[tokio::test]
async fn test_clear_content_keeps_record() {
    let store = setup().await;
    let entity = Entity::file("n.md", 1_000, 5);
    store.upsert("v", "p", &entity).await.unwrap();
    store
        .upsert_content("v", "p", "n.md", b"hello")
        .await
        .unwrap();

    store.clear_content("v", "p", "n.md").await.unwrap();
    assert_eq!(store.get_content("v", "p", "n.md").await.unwrap(), None);
    assert_eq!(store.get_all("v", "p").await.unwrap(), vec![entity]);

    // Nothing stored is not an error
    store.clear_content("v", "p", "never.md").await.unwrap();
}

#[tokio::test]
async fn test_content_requires_record() {
    let store = setup().await;
    let err = store
        .upsert_content("v", "p", "ghost.md", b"boo")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost.md"));
}

#[tokio::test]
async fn test_get_content_without_stored_content() {
    let store = setup().await;
    store
        .upsert("v", "p", &Entity::file("x.bin", 1_000, 5))
        .await
        .unwrap();
    assert_eq!(store.get_content("v", "p", "x.bin").await.unwrap(), None);
    assert_eq!(store.get_content("v", "p", "missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_clear_missing_key_is_noop() {
    let store = setup().await;
    store.clear("v", "p", "never.md").await.unwrap();
}

#[tokio::test]
async fn test_forget_drops_all_records_of_scope() {
    let store = setup().await;
    for key in ["a.md", "b.md", "c/"] {
        let entity = if key.ends_with('/') {
            Entity::folder(key)
        } else {
            Entity::file(key, 1_000, 1)
        };
        store.upsert("v", "p", &entity).await.unwrap();
    }
    store
        .upsert("v", "keep", &Entity::file("a.md", 1_000, 1))
        .await
        .unwrap();

    assert_eq!(store.forget("v", "p").await.unwrap(), 3);
    assert_eq!(store.count_records("v", "p").await.unwrap(), 0);
    assert_eq!(store.count_records("v", "keep").await.unwrap(), 1);
}

// ============================================================================
// Plans
// ============================================================================

#[tokio::test]
async fn test_latest_plan_none_when_empty() {
    let store = setup().await;
    assert!(store.latest_plan("v", "p").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_and_load_latest_plan() {
    let store = setup().await;
    let first = plan_with(&[("a.md", Decision::Equal)], TriggerSource::Auto);
    let second = plan_with(
        &[
            ("a.md", Decision::LocalIsModifiedThenPush),
            ("b.md", Decision::RemoteIsCreatedThenPull),
        ],
        TriggerSource::Dry,
    );

    store.save_plan("v", "p", &first).await.unwrap();
    store.save_plan("v", "p", &second).await.unwrap();

    let latest = store.latest_plan("v", "p").await.unwrap().unwrap();
    assert_eq!(latest, second);
    assert_eq!(latest.meta.trigger, TriggerSource::Dry);
    assert_eq!(
        latest.decision_of("b.md"),
        Some(Decision::RemoteIsCreatedThenPull)
    );
    assert_eq!(latest.get("a.md").unwrap().decision_branch, Some(42));
}

#[tokio::test]
async fn test_recent_plans_newest_first() {
    let store = setup().await;
    let triggers = [TriggerSource::Startup, TriggerSource::Manual, TriggerSource::Auto];
    for trigger in triggers {
        let plan = plan_with(&[("a.md", Decision::Equal)], trigger);
        store.save_plan("v", "p", &plan).await.unwrap();
    }

    let records = store.recent_plans("v", "p", 10).await.unwrap();
    let got: Vec<TriggerSource> = records.iter().map(|r| r.trigger).collect();
    assert_eq!(
        got,
        vec![TriggerSource::Auto, TriggerSource::Manual, TriggerSource::Startup]
    );
    assert_eq!(records[0].total, 1);
    assert_eq!(records[0].changes, 0);
}

#[tokio::test]
async fn test_plan_retention_prunes_oldest() {
    let pool = DatabasePool::in_memory().await.unwrap();
    let store = SqliteStateStore::new(pool.pool().clone()).with_plan_retention(2);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let plan = plan_with(&[("a.md", Decision::Equal)], TriggerSource::Manual);
        ids.push(plan.meta.run_id);
        store.save_plan("v", "p", &plan).await.unwrap();
    }
    // Other scopes are not pruned by this one
    let other = plan_with(&[("a.md", Decision::Equal)], TriggerSource::Manual);
    store.save_plan("v", "q", &other).await.unwrap();

    let kept: Vec<_> = store
        .recent_plans("v", "p", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.run_id)
        .collect();
    assert_eq!(kept, vec![ids[3], ids[2]]);
    assert_eq!(store.recent_plans("v", "q", 10).await.unwrap().len(), 1);
}
