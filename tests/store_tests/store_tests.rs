//! Tests for Store and persistence
//!
//! These tests verify:
//! - A persist sees every mutation enqueued before it
//! - Writes followed by a persist are readable, and survive a reopen
//! - Failed persists do not wedge the chain
//! - Document errors surface through scheduled units
//! - Close flushes and stops the chain
//! - Construction errors

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use turbostore::engine::snapshot::decode;
use turbostore::engine::{FsAdapter, MemoryAdapter};
use turbostore::{Config, Store, StoreError};

const DB_NAME: &str = "Test.db";

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .db_name(DB_NAME)
        .autosave(false)
        .callback_timeout_ms(Some(5_000))
        .build()
}

async fn memory_store(adapter: &MemoryAdapter) -> Store {
    let store = Store::with_adapter(test_config(), Arc::new(adapter.clone())).unwrap();
    store.initialize().await.unwrap();
    store
}

/// Number of documents a saved snapshot holds for `collection`
fn saved_count(adapter: &MemoryAdapter, collection: &str) -> usize {
    let bytes = adapter.snapshot(DB_NAME).expect("nothing saved");
    let snapshot = decode(&bytes).unwrap();
    snapshot
        .collections
        .iter()
        .find(|c| c.name == collection)
        .map(|c| c.documents.len())
        .unwrap_or(0)
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[tokio::test]
async fn test_persist_includes_every_earlier_mutation() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    // Queue the inserts without awaiting any of them.
    let inserts: Vec<_> = (0..25)
        .map(|i| {
            store.run("insert customer", move |collections| {
                collections.customers()?.insert(json!({ "studentId": i }))
            })
        })
        .collect();
    let persisted = store.persist();

    persisted.await.unwrap();
    assert_eq!(saved_count(&adapter, "customers"), 25);
    assert_eq!(adapter.save_count(), 1);

    for insert in inserts {
        insert.await.unwrap();
    }
}

#[tokio::test]
async fn test_persist_excludes_later_mutations() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    let persisted = store.persist();
    let late = store.run("late insert", |collections| {
        collections.images()?.insert(json!({ "studentId": 1 }))
    });

    persisted.await.unwrap();
    late.await.unwrap();
    assert_eq!(saved_count(&adapter, "images"), 0);
}

#[tokio::test]
async fn test_write_then_persist_is_visible() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    let write = store.run("add customer", |collections| {
        collections
            .customers()?
            .insert(json!({ "studentId": 7, "name": "Ada" }))
    });
    let persisted = store.persist();

    let id = write.await.unwrap();
    persisted.await.unwrap();

    let found = store
        .customers()
        .unwrap()
        .find_one_by("studentId", &json!(7))
        .unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.data["name"], "Ada");
}

#[tokio::test]
async fn test_persisted_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .db_name(DB_NAME)
        .data_dir(temp_dir.path())
        .autosave(false)
        .build();

    {
        let store = Store::new(config.clone()).unwrap();
        store.initialize().await.unwrap();
        store
            .run("add customer", |collections| {
                collections.customers()?.insert(json!({ "studentId": 7 }))
            })
            .await
            .unwrap();
        store.persist().await.unwrap();
        store.close().await.unwrap();
    }

    assert!(FsAdapter::new(temp_dir.path())
        .snapshot_path(DB_NAME)
        .exists());

    let store = Store::new(config).unwrap();
    store.initialize().await.unwrap();
    assert!(store
        .customers()
        .unwrap()
        .find_one_by("studentId", &json!(7))
        .is_some());
}

#[tokio::test]
async fn test_failed_persist_does_not_wedge_chain() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    adapter.set_fail_saves(true);
    let failed = store.persist();
    let after = store.run("after failed persist", |collections| {
        collections.temporary_storage()?.insert(json!({ "scratch": true }))
    });

    assert!(matches!(failed.await, Err(StoreError::Save(_))));
    after.await.unwrap();

    adapter.set_fail_saves(false);
    store.persist().await.unwrap();
    assert_eq!(saved_count(&adapter, "temporaryStorage"), 1);
}

#[tokio::test]
async fn test_persist_before_initialize_fails() {
    let adapter = MemoryAdapter::new();
    let store = Store::with_adapter(test_config(), Arc::new(adapter.clone())).unwrap();

    assert!(matches!(store.persist().await, Err(StoreError::Save(_))));
    assert_eq!(adapter.save_count(), 0);
}

// =============================================================================
// Scheduled Unit Tests
// =============================================================================

#[tokio::test]
async fn test_unique_violation_surfaces_through_run() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    let first = store.run("add", |collections| {
        collections.customers()?.insert(json!({ "studentId": 1 }))
    });
    let duplicate = store.run("add again", |collections| {
        collections.customers()?.insert(json!({ "studentId": 1 }))
    });

    first.await.unwrap();
    assert!(matches!(
        duplicate.await,
        Err(StoreError::UniqueViolation { .. })
    ));
    assert_eq!(store.customers().unwrap().count(), 1);
}

#[tokio::test]
async fn test_clones_share_one_chain() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;
    let other = store.clone();

    let a = store.run("from first handle", |collections| {
        collections.images()?.insert(json!({ "studentId": 1 }))
    });
    let b = other.run("from clone", |collections| {
        collections.images()?.insert(json!({ "studentId": 1 }))
    });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(b > a);
    assert!(other.has_been_init());
    assert_eq!(other.images().unwrap().find_by("studentId", &json!(1)).len(), 2);
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_close_flushes_and_stops_chain() {
    let adapter = MemoryAdapter::new();
    let store = memory_store(&adapter).await;

    let _queued = store.run("queued before close", |collections| {
        collections.images()?.insert(json!({ "studentId": 9 }))
    });
    store.close().await.unwrap();

    assert_eq!(saved_count(&adapter, "images"), 1);
    assert!(!store.engine().collection_names().is_empty());

    let late = store.run("after close", |_| Ok(()));
    assert!(matches!(late.await, Err(StoreError::SchedulerClosed)));
}

#[tokio::test]
async fn test_close_without_initialize() {
    let adapter = MemoryAdapter::new();
    let store = Store::with_adapter(test_config(), Arc::new(adapter.clone())).unwrap();

    store.close().await.unwrap();
    assert_eq!(adapter.save_count(), 0);
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_store_requires_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp_dir.path()).build();

    assert!(matches!(Store::new(config), Err(StoreError::Config(_))));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = Config::builder().db_name("").build();

    assert!(matches!(
        Store::with_adapter(config, Arc::new(MemoryAdapter::new())),
        Err(StoreError::Config(_))
    ));
}
