//! Document database
//!
//! Bundled `StorageEngine` implementation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StoreError};

use super::collection::{Collection, CollectionHandle, CollectionOptions};
use super::snapshot::{self, DbSnapshot};
use super::{EngineOptions, LoadedCallback, PersistenceAdapter, SaveCallback, StorageEngine};

/// Requests handled by the worker thread
enum Request {
    Save(SaveCallback),
    Shutdown,
}

/// State shared between the handle and the worker thread
struct DbShared {
    name: RwLock<String>,
    adapter: RwLock<Option<Arc<dyn PersistenceAdapter>>>,
    collections: RwLock<BTreeMap<String, CollectionHandle>>,
    /// Set by any collection mutation, cleared by a successful save
    dirty: Arc<AtomicBool>,
}

struct Worker {
    requests: Sender<Request>,
    thread: Option<JoinHandle<()>>,
}

/// In-memory document database with snapshot persistence
///
/// ## Threading
/// `open` spawns one worker thread. The worker loads the snapshot, fires
/// the loaded callback, then serves explicit saves and the autosave ticker
/// until `close` (or drop). Collection reads and writes happen on the
/// caller's thread and never go through the worker.
///
/// ## Consistency
/// Each collection is captured under its own lock, but autosave and the
/// final save on close know nothing about the store's scheduled units. A
/// unit that writes several documents can be caught half-applied by either
/// one. Only an explicit save requested after the unit completes is
/// guaranteed to contain all of it.
pub struct DocumentDb {
    shared: Arc<DbShared>,
    worker: Mutex<Option<Worker>>,
}

impl DocumentDb {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(DbShared {
                name: RwLock::new(String::new()),
                adapter: RwLock::new(None),
                collections: RwLock::new(BTreeMap::new()),
                dirty: Arc::new(AtomicBool::new(false)),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Whether unsaved changes exist
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::SeqCst)
    }

    /// Whether the worker is running
    pub fn is_open(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Database name given to `open`
    pub fn name(&self) -> String {
        self.shared.name.read().clone()
    }
}

impl Default for DocumentDb {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for DocumentDb {
    fn open(&self, name: &str, options: EngineOptions, on_loaded: LoadedCallback) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            on_loaded(Err(StoreError::AlreadyOpen));
            return;
        }

        *self.shared.name.write() = name.to_string();
        *self.shared.adapter.write() = Some(Arc::clone(&options.adapter));

        let (requests, inbox) = channel::unbounded();
        let shared = Arc::clone(&self.shared);

        // The callback must fire even if the thread cannot be spawned.
        let loaded_slot = Arc::new(Mutex::new(Some(on_loaded)));
        let thread_slot = Arc::clone(&loaded_slot);

        let spawned = thread::Builder::new()
            .name("turbostore-engine".to_string())
            .spawn(move || {
                let loaded = if options.autoload {
                    shared.load()
                } else {
                    Ok(())
                };
                let ok = loaded.is_ok();
                if let Some(callback) = thread_slot.lock().take() {
                    callback(loaded);
                }
                if ok {
                    shared.serve(inbox, &options);
                } else {
                    reject_saves(inbox);
                }
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker {
                    requests,
                    thread: Some(handle),
                });
            }
            Err(e) => {
                tracing::error!("Failed to spawn engine worker: {}", e);
                if let Some(callback) = loaded_slot.lock().take() {
                    callback(Err(e.into()));
                }
            }
        }
    }

    fn get_collection(&self, name: &str) -> Option<CollectionHandle> {
        self.shared.collections.read().get(name).cloned()
    }

    fn add_collection(&self, name: &str, options: CollectionOptions) -> Result<CollectionHandle> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidDocument(
                "collection name must not be empty".to_string(),
            ));
        }

        let mut collections = self.shared.collections.write();
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection = Arc::new(Collection::new(
            name,
            options,
            Arc::clone(&self.shared.dirty),
        ));
        collections.insert(name.to_string(), Arc::clone(&collection));
        self.shared.dirty.store(true, Ordering::SeqCst);

        tracing::debug!(collection = name, "collection added");
        Ok(collection)
    }

    fn save_database(&self, on_done: SaveCallback) {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            on_done(Err(StoreError::Save("engine is not open".to_string())));
            return;
        };

        if let Err(channel::SendError(request)) = worker.requests.send(Request::Save(on_done)) {
            // Worker thread has already exited.
            if let Request::Save(on_done) = request {
                on_done(Err(StoreError::Save("engine worker has stopped".to_string())));
            }
        }
    }

    fn collection_names(&self) -> Vec<String> {
        self.shared.collections.read().keys().cloned().collect()
    }

    fn close(&self) {
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };

        let _ = worker.requests.send(Request::Shutdown);
        if let Some(handle) = worker.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Engine worker panicked");
            }
        }
        tracing::debug!("Engine closed");
    }
}

impl Drop for DocumentDb {
    fn drop(&mut self) {
        self.close();
    }
}

impl DbShared {
    /// Replace in-memory collections with the stored snapshot, if any
    fn load(&self) -> Result<()> {
        let adapter = self.adapter()?;
        let name = self.name.read().clone();

        let Some(bytes) = adapter.load(&name)? else {
            tracing::debug!(db = %name, "No snapshot found, starting empty");
            return Ok(());
        };

        let snapshot = snapshot::decode(&bytes)?;
        let mut restored = BTreeMap::new();
        for collection in snapshot.collections {
            let collection = Collection::restore(collection, Arc::clone(&self.dirty))?;
            restored.insert(collection.name().to_string(), Arc::new(collection));
        }

        tracing::info!(
            db = %name,
            collections = restored.len(),
            bytes = bytes.len(),
            "Snapshot loaded"
        );

        *self.collections.write() = restored;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Encode every collection and hand the bytes to the adapter
    fn save(&self) -> Result<()> {
        let adapter = self.adapter()?;
        let name = self.name.read().clone();

        // Cleared first so writes racing with the save mark it dirty again.
        self.dirty.store(false, Ordering::SeqCst);

        let result = self.encode(&name).and_then(|bytes| adapter.save(&name, &bytes));
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    fn encode(&self, name: &str) -> Result<bytes::Bytes> {
        let collections = self
            .collections
            .read()
            .values()
            .map(|collection| collection.snapshot())
            .collect::<Result<Vec<_>>>()?;

        snapshot::encode(&DbSnapshot {
            name: name.to_string(),
            collections,
        })
    }

    fn adapter(&self) -> Result<Arc<dyn PersistenceAdapter>> {
        self.adapter
            .read()
            .clone()
            .ok_or_else(|| StoreError::Save("no persistence adapter configured".to_string()))
    }

    /// Worker loop: explicit saves and autosave until shutdown
    fn serve(&self, inbox: Receiver<Request>, options: &EngineOptions) {
        let ticker = if options.autosave {
            channel::tick(options.autosave_interval)
        } else {
            channel::never()
        };

        loop {
            crossbeam::select! {
                recv(inbox) -> request => match request {
                    Ok(Request::Save(on_done)) => {
                        let started = Instant::now();
                        let result = self.save();
                        tracing::debug!(
                            ok = result.is_ok(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Explicit save finished"
                        );
                        on_done(result);
                    }
                    Ok(Request::Shutdown) | Err(_) => break,
                },
                recv(ticker) -> _ => {
                    if self.dirty.load(Ordering::SeqCst) {
                        if let Err(e) = self.save() {
                            tracing::warn!("Autosave failed: {}", e);
                        } else {
                            tracing::trace!("Autosave completed");
                        }
                    }
                }
            }
        }

        // Final flush so autosaved databases do not lose the last interval.
        if options.autosave && self.dirty.load(Ordering::SeqCst) {
            if let Err(e) = self.save() {
                tracing::warn!("Final save on close failed: {}", e);
            }
        }
    }
}

/// Worker loop after a failed load: every save is refused until shutdown
fn reject_saves(inbox: Receiver<Request>) {
    while let Ok(Request::Save(on_done)) = inbox.recv() {
        on_done(Err(StoreError::Save(
            "engine failed to load; saves are disabled".to_string(),
        )));
    }
}
