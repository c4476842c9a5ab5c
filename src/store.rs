//! Store
//!
//! The embedder-facing handle that ties the components together.
//!
//! ## Usage
//! ```no_run
//! # async fn demo() -> turbostore::Result<()> {
//! use serde_json::json;
//! use turbostore::{Config, Store};
//!
//! let store = Store::new(Config::builder().data_dir("./turbo_data").build())?;
//! store.initialize().await?;
//!
//! store
//!     .run("add customer", |collections| {
//!         collections.customers()?.insert(json!({ "studentId": 7, "name": "Ada" }))
//!     })
//!     .await?;
//! store.persist().await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{
    CollectionHandle, DocumentDb, FsAdapter, PersistenceAdapter, StorageEngine,
};
use crate::error::{Result, StoreError};
use crate::lifecycle::{InitHandle, LifecycleState, StoreLifecycle};
use crate::persistence::PersistenceScheduler;
use crate::registry::{CollectionName, CollectionRegistry};
use crate::scheduler::{Completion, Scheduler};

/// An embedded document store
///
/// Construct one per process and clone it to share; clones refer to the
/// same chain, engine and readiness flag.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: Config,
    engine: Arc<dyn StorageEngine>,
    scheduler: Scheduler,
    lifecycle: StoreLifecycle,
    registry: CollectionRegistry,
    persistence: PersistenceScheduler,
}

impl Store {
    /// Store backed by the bundled engine and snapshot files in
    /// `config.data_dir`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let adapter = Arc::new(FsAdapter::new(config.data_dir.clone()));
        Self::with_adapter(config, adapter)
    }

    /// Store backed by the bundled engine and a custom persistence adapter
    pub fn with_adapter(config: Config, adapter: Arc<dyn PersistenceAdapter>) -> Result<Self> {
        Self::with_engine(config, Arc::new(DocumentDb::new()), adapter)
    }

    /// Store on top of any engine implementation
    pub fn with_engine(
        config: Config,
        engine: Arc<dyn StorageEngine>,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> Result<Self> {
        config.validate()?;

        let scheduler = Scheduler::new(config.failure_policy)?;
        let lifecycle = StoreLifecycle::new(
            &config,
            Arc::clone(&engine),
            adapter,
            scheduler.clone(),
        );
        let registry = CollectionRegistry::new(Arc::clone(&engine), lifecycle.readiness());
        let persistence = PersistenceScheduler::new(
            Arc::clone(&engine),
            scheduler.clone(),
            config.callback_timeout(),
        );

        tracing::debug!(db = %config.db_name, "Store constructed");

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                engine,
                scheduler,
                lifecycle,
                registry,
                persistence,
            }),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start (or join) the bootstrap; every caller shares one outcome
    pub fn initialize(&self) -> InitHandle {
        self.inner.lifecycle.initialize()
    }

    /// Whether bootstrap has completed successfully
    pub fn has_been_init(&self) -> bool {
        self.inner.lifecycle.has_been_init()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Flush, stop the chain and shut the engine down
    ///
    /// Runs as the last unit on the chain: everything enqueued before it
    /// completes first, and anything enqueued after `close` returns
    /// resolves with `SchedulerClosed`.
    pub async fn close(&self) -> Result<()> {
        let flushed = if self.has_been_init() {
            self.persist().await
        } else {
            Ok(())
        };

        let engine = Arc::clone(&self.inner.engine);
        let closed = self.inner.scheduler.enqueue("close", move || async move {
            tokio::task::spawn_blocking(move || engine.close())
                .await
                .map_err(|e| StoreError::UnitPanicked(e.to_string()))
        });
        self.inner.scheduler.shutdown();

        closed.await?;
        tracing::info!(db = %self.inner.config.db_name, "Store closed");
        flushed
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Typed collection accessors; `NotReady` before bootstrap completes
    pub fn collections(&self) -> &CollectionRegistry {
        &self.inner.registry
    }

    pub fn collection(&self, name: CollectionName) -> Result<CollectionHandle> {
        self.inner.registry.collection(name)
    }

    pub fn customers(&self) -> Result<CollectionHandle> {
        self.inner.registry.customers()
    }

    pub fn images(&self) -> Result<CollectionHandle> {
        self.inner.registry.images()
    }

    pub fn trained_recognizer(&self) -> Result<CollectionHandle> {
        self.inner.registry.trained_recognizer()
    }

    pub fn temporary_storage(&self) -> Result<CollectionHandle> {
        self.inner.registry.temporary_storage()
    }

    // =========================================================================
    // Scheduled Operations
    // =========================================================================

    /// Run `work` against the collections as one unit on the chain
    pub fn run<T, F>(&self, label: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&CollectionRegistry) -> Result<T> + Send + 'static,
    {
        let registry = self.inner.registry.clone();
        self.inner
            .scheduler
            .enqueue(label, move || async move { work(&registry) })
    }

    /// Save to durable storage after every unit enqueued so far
    pub fn persist(&self) -> Completion<()> {
        self.inner.persistence.persist()
    }

    /// The chain itself, for callers scheduling their own async units
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Underlying engine handle
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.inner.engine
    }
}
