//! Tests for DocumentDb
//!
//! These tests verify:
//! - The loaded callback fires on open (with and without a snapshot)
//! - Explicit saves through the save callback
//! - Restoring collections, documents and indices from a snapshot
//! - Load/save failures and corruption are reported, not swallowed
//! - Autosave and the final save on close
//! - The filesystem adapter

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use turbostore::engine::{
    CollectionOptions, DocumentDb, EngineOptions, FsAdapter, MemoryAdapter, PersistenceAdapter,
    StorageEngine,
};
use turbostore::{Result, StoreError};

const DB_NAME: &str = "Test.db";

// =============================================================================
// Helper Functions
// =============================================================================

fn options(adapter: Arc<dyn PersistenceAdapter>, autosave: bool) -> EngineOptions {
    EngineOptions {
        adapter,
        autoload: true,
        autosave,
        autosave_interval: Duration::from_millis(20),
    }
}

/// Open and block until the loaded callback fires
fn open(db: &DocumentDb, options: EngineOptions) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    db.open(
        DB_NAME,
        options,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    rx.recv_timeout(Duration::from_secs(5))
        .expect("loaded callback never fired")
}

/// Save and block until the save callback fires
fn save(db: &DocumentDb) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    db.save_database(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.recv_timeout(Duration::from_secs(5))
        .expect("save callback never fired")
}

fn open_memory(adapter: &MemoryAdapter) -> DocumentDb {
    let db = DocumentDb::new();
    open(&db, options(Arc::new(adapter.clone()), false)).unwrap();
    db
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_without_snapshot_starts_empty() {
    let adapter = MemoryAdapter::new();
    let db = open_memory(&adapter);

    assert!(db.is_open());
    assert_eq!(db.name(), DB_NAME);
    assert!(db.collection_names().is_empty());
}

#[test]
fn test_open_twice_reports_already_open() {
    let adapter = MemoryAdapter::new();
    let db = open_memory(&adapter);

    let second = open(&db, options(Arc::new(adapter.clone()), false));
    assert!(matches!(second, Err(StoreError::AlreadyOpen)));
}

#[test]
fn test_open_reports_load_failure() {
    let adapter = MemoryAdapter::new();
    adapter.set_fail_loads(true);

    let db = DocumentDb::new();
    let result = open(&db, options(Arc::new(adapter), false));

    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn test_open_reports_corrupt_snapshot() {
    let adapter = MemoryAdapter::new();
    adapter.put_raw(DB_NAME, b"definitely not a snapshot".to_vec());

    let db = DocumentDb::new();
    let result = open(&db, options(Arc::new(adapter), false));

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_open_without_autoload_ignores_snapshot() {
    let adapter = MemoryAdapter::new();
    {
        let db = open_memory(&adapter);
        db.add_collection("kept", CollectionOptions::new()).unwrap();
        save(&db).unwrap();
    }

    let db = DocumentDb::new();
    let mut opts = options(Arc::new(adapter), false);
    opts.autoload = false;
    open(&db, opts).unwrap();

    assert!(db.get_collection("kept").is_none());
}

// =============================================================================
// Collection Management Tests
// =============================================================================

#[test]
fn test_add_collection_is_noop_when_present() {
    let db = DocumentDb::new();

    let first = db
        .add_collection("customers", CollectionOptions::new().unique("studentId"))
        .unwrap();
    first.insert(json!({ "studentId": 1 })).unwrap();

    // Different options on the second call are ignored.
    let second = db
        .add_collection("customers", CollectionOptions::new())
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.count(), 1);
    assert_eq!(second.options().unique, vec!["studentId".to_string()]);
    assert_eq!(db.collection_names(), vec!["customers".to_string()]);
}

#[test]
fn test_add_collection_rejects_empty_name() {
    let db = DocumentDb::new();
    assert!(db.add_collection(" ", CollectionOptions::new()).is_err());
}

// =============================================================================
// Save / Restore Tests
// =============================================================================

#[test]
fn test_save_and_restore() {
    let adapter = MemoryAdapter::new();
    let saved_id;
    {
        let db = open_memory(&adapter);
        let customers = db
            .add_collection("customers", CollectionOptions::new().unique("studentId"))
            .unwrap();
        db.add_collection("temporaryStorage", CollectionOptions::new())
            .unwrap();
        saved_id = customers
            .insert(json!({ "studentId": 7, "name": "Ada" }))
            .unwrap();

        assert!(db.is_dirty());
        save(&db).unwrap();
        assert!(!db.is_dirty());
        assert_eq!(adapter.save_count(), 1);
    }

    let db = open_memory(&adapter);
    assert_eq!(
        db.collection_names(),
        vec!["customers".to_string(), "temporaryStorage".to_string()]
    );

    let customers = db.get_collection("customers").unwrap();
    let found = customers.find_one_by("studentId", &json!(7)).unwrap();
    assert_eq!(found.id, saved_id);
    assert_eq!(found.data["name"], "Ada");

    // Indices and constraints come back with the data.
    assert!(customers.is_indexed("studentId"));
    assert!(customers.insert(json!({ "studentId": 7 })).is_err());
    // Ids continue after the restored ones.
    assert!(customers.insert(json!({ "studentId": 8 })).unwrap() > saved_id);
}

#[test]
fn test_save_failure_keeps_database_dirty() {
    let adapter = MemoryAdapter::new();
    let db = open_memory(&adapter);
    db.add_collection("images", CollectionOptions::new()).unwrap();

    adapter.set_fail_saves(true);
    assert!(save(&db).is_err());
    assert!(db.is_dirty());

    adapter.set_fail_saves(false);
    save(&db).unwrap();
    assert!(!db.is_dirty());
}

#[test]
fn test_save_before_open_fails() {
    let db = DocumentDb::new();
    assert!(matches!(save(&db), Err(StoreError::Save(_))));
}

#[test]
fn test_save_after_failed_open_fails() {
    let adapter = MemoryAdapter::new();
    adapter.set_fail_loads(true);
    let db = DocumentDb::new();
    assert!(open(&db, options(Arc::new(adapter), false)).is_err());

    assert!(matches!(save(&db), Err(StoreError::Save(_))));
}

// =============================================================================
// Autosave Tests
// =============================================================================

#[test]
fn test_autosave_persists_dirty_database() {
    let adapter = MemoryAdapter::new();
    let db = DocumentDb::new();
    open(&db, options(Arc::new(adapter.clone()), true)).unwrap();

    db.add_collection("images", CollectionOptions::new()).unwrap();

    let mut waited = Duration::ZERO;
    while adapter.save_count() == 0 && waited < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    assert!(adapter.save_count() >= 1);
    assert!(adapter.snapshot(DB_NAME).is_some());
}

#[test]
fn test_autosave_skips_clean_database() {
    let adapter = MemoryAdapter::new();
    let db = DocumentDb::new();
    open(&db, options(Arc::new(adapter.clone()), true)).unwrap();

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(adapter.save_count(), 0);
}

#[test]
fn test_close_flushes_when_autosaving() {
    let adapter = MemoryAdapter::new();
    let db = DocumentDb::new();
    let mut opts = options(Arc::new(adapter.clone()), true);
    opts.autosave_interval = Duration::from_secs(3600);
    open(&db, opts).unwrap();

    db.add_collection("images", CollectionOptions::new()).unwrap();
    db.close();

    assert!(!db.is_open());
    assert_eq!(adapter.save_count(), 1);
    // Closing again is harmless.
    db.close();
}

// =============================================================================
// Filesystem Adapter Tests
// =============================================================================

#[test]
fn test_fs_adapter_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let adapter = FsAdapter::new(&data_dir);

    assert!(adapter.load(DB_NAME).unwrap().is_none());

    adapter.save(DB_NAME, b"first").unwrap();
    adapter.save(DB_NAME, b"second").unwrap();

    assert_eq!(adapter.load(DB_NAME).unwrap(), Some(b"second".to_vec()));
    assert!(adapter.snapshot_path(DB_NAME).exists());
    assert_eq!(adapter.dir(), data_dir.as_path());
}

#[test]
fn test_fs_backed_database_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let adapter: Arc<dyn PersistenceAdapter> = Arc::new(FsAdapter::new(temp_dir.path()));

    {
        let db = DocumentDb::new();
        open(&db, options(Arc::clone(&adapter), false)).unwrap();
        let images = db
            .add_collection("images", CollectionOptions::new().index("studentId"))
            .unwrap();
        images.insert(json!({ "studentId": 3, "bytes": "AAAA" })).unwrap();
        images.insert(json!({ "studentId": 3, "bytes": "BBBB" })).unwrap();
        save(&db).unwrap();
    }

    let db = DocumentDb::new();
    open(&db, options(adapter, false)).unwrap();
    let images = db.get_collection("images").unwrap();
    assert_eq!(images.find_by("studentId", &json!(3)).len(), 2);
}
