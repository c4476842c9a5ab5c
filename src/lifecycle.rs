//! Store Lifecycle
//!
//! Owns the readiness flag and the bootstrap unit.
//!
//! ## State Machine
//! ```text
//!   Uninitialized ──► Opening ──► CreatingCollections ──► Ready
//!                        │                 │
//!                        └──────► Failed ◄─┘
//! ```
//! `Ready` and `Failed` are terminal. A failed bootstrap is not retried;
//! `initialize` keeps returning the same failed handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::callback;
use crate::config::Config;
use crate::engine::{EngineOptions, PersistenceAdapter, StorageEngine};
use crate::error::{Result, StoreError};
use crate::registry::CollectionName;
use crate::scheduler::{Scheduler, SharedCompletion};

/// Handle every `initialize` caller awaits; clones share one bootstrap
pub type InitHandle = SharedCompletion<()>;

/// Where the store is in its bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Opening,
    CreatingCollections,
    Ready,
    Failed,
}

/// Drives the one-time bootstrap of the store
pub struct StoreLifecycle {
    engine: Arc<dyn StorageEngine>,
    scheduler: Scheduler,
    bootstrap: Bootstrap,
    init: Mutex<Option<InitHandle>>,
}

/// Everything the bootstrap unit needs, cloned into it when enqueued
#[derive(Clone)]
struct Bootstrap {
    engine: Arc<dyn StorageEngine>,
    db_name: String,
    options: EngineOptions,
    callback_timeout: Option<Duration>,
    ready: Arc<AtomicBool>,
    state: Arc<Mutex<LifecycleState>>,
}

impl StoreLifecycle {
    pub fn new(
        config: &Config,
        engine: Arc<dyn StorageEngine>,
        adapter: Arc<dyn PersistenceAdapter>,
        scheduler: Scheduler,
    ) -> Self {
        let options = EngineOptions {
            adapter,
            autoload: config.autoload,
            autosave: config.autosave,
            autosave_interval: config.autosave_interval(),
        };

        Self {
            engine: Arc::clone(&engine),
            scheduler,
            bootstrap: Bootstrap {
                engine,
                db_name: config.db_name.clone(),
                options,
                callback_timeout: config.callback_timeout(),
                ready: Arc::new(AtomicBool::new(false)),
                state: Arc::new(Mutex::new(LifecycleState::Uninitialized)),
            },
            init: Mutex::new(None),
        }
    }

    /// Enqueue the bootstrap unit, or return the handle of the one already
    /// enqueued
    pub fn initialize(&self) -> InitHandle {
        let mut init = self.init.lock();
        if let Some(handle) = init.as_ref() {
            return handle.clone();
        }

        let bootstrap = self.bootstrap.clone();
        let handle = self
            .scheduler
            .enqueue("bootstrap", move || bootstrap.run())
            .shared();

        *init = Some(handle.clone());
        handle
    }

    /// Whether bootstrap has completed successfully. Never blocks.
    pub fn has_been_init(&self) -> bool {
        self.bootstrap.ready.load(Ordering::Acquire)
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.bootstrap.state.lock()
    }

    /// The engine handle this lifecycle opens
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub(crate) fn readiness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.bootstrap.ready)
    }
}

impl Bootstrap {
    async fn run(self) -> Result<()> {
        // Any exit short of Ready (error return or engine panic) lands in Failed.
        let mut guard = FailedOnDrop {
            bootstrap: &self,
            armed: true,
        };

        self.transition(LifecycleState::Opening);
        tracing::info!(db = %self.db_name, "Opening store");

        if let Err(e) = self.open_engine().await {
            tracing::error!(db = %self.db_name, "Engine failed to open: {}", e);
            return Err(StoreError::EngineOpen(e.to_string()));
        }

        self.transition(LifecycleState::CreatingCollections);
        if let Err(e) = self.declare_collections() {
            tracing::error!(db = %self.db_name, "Collection bootstrap failed: {}", e);
            return Err(e);
        }

        guard.armed = false;
        self.ready.store(true, Ordering::Release);
        self.transition(LifecycleState::Ready);
        tracing::info!(db = %self.db_name, "Store has been loaded");
        Ok(())
    }

    async fn open_engine(&self) -> Result<()> {
        let (on_loaded, loaded) = callback::channel();
        self.engine.open(&self.db_name, self.options.clone(), on_loaded);
        callback::wait("open", loaded, self.callback_timeout).await
    }

    /// Create each declared collection that does not exist yet
    fn declare_collections(&self) -> Result<()> {
        for name in CollectionName::ALL {
            if self.engine.get_collection(name.as_str()).is_some() {
                tracing::debug!(collection = name.as_str(), "Collection already present");
                continue;
            }

            self.engine
                .add_collection(name.as_str(), name.options())
                .map_err(|e| StoreError::CollectionCreate {
                    name: name.as_str().to_string(),
                    reason: e.to_string(),
                })?;
            tracing::info!(collection = name.as_str(), "Collection created");
        }
        Ok(())
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        let from = *state;
        tracing::debug!(?from, to = ?next, "Lifecycle transition");
        *state = next;
    }
}

/// Moves the lifecycle to `Failed` when dropped while still armed
struct FailedOnDrop<'a> {
    bootstrap: &'a Bootstrap,
    armed: bool,
}

impl Drop for FailedOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.bootstrap.transition(LifecycleState::Failed);
        }
    }
}
