//! Engine Module
//!
//! The document database the store runs on top of.
//!
//! ## Responsibilities
//! - Hold named collections of JSON documents in memory
//! - Maintain per-collection field indices and unique constraints
//! - Load the last snapshot on open, save snapshots on request
//! - Autosave in the background while something is dirty
//!
//! ## Callback Surface
//! The engine is callback-based: `open` and `save_database` return
//! immediately and report completion by invoking the supplied callback from
//! the engine's worker thread. Everything above this module converts those
//! callbacks into futures; nothing else in the crate touches them.
//!
//! ```text
//!   open(name, options, on_loaded) ──► worker thread ──► load snapshot
//!                                            │                │
//!                                            │          on_loaded(result)
//!                                            ▼
//!                            ┌─── select ───┴─── autosave tick ──┐
//!                            │                                    │
//!                   Save(on_done) → save → on_done(result)   save if dirty
//! ```

mod adapter;
mod collection;
mod database;
pub mod snapshot;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

pub use adapter::{FsAdapter, MemoryAdapter, PersistenceAdapter};
pub use collection::{Collection, CollectionHandle, CollectionOptions, Document};
pub use database::DocumentDb;

/// Callback invoked once the engine has finished loading
pub type LoadedCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Callback invoked once an explicit save has finished
pub type SaveCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Options passed to `StorageEngine::open`
#[derive(Clone)]
pub struct EngineOptions {
    /// Durable storage the engine loads from and saves to
    pub adapter: Arc<dyn PersistenceAdapter>,

    /// Load the last snapshot before reporting `loaded`
    pub autoload: bool,

    /// Save periodically in the background
    pub autosave: bool,

    /// Period of the background save
    pub autosave_interval: Duration,
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("adapter", &self.adapter)
            .field("autoload", &self.autoload)
            .field("autosave", &self.autosave)
            .field("autosave_interval", &self.autosave_interval)
            .finish()
    }
}

/// The storage engine capability the store is built on
///
/// Implementations must be safe to share across threads. `open` and
/// `save_database` must eventually invoke their callback exactly once;
/// the store bounds the wait with its configured callback timeout.
pub trait StorageEngine: Send + Sync {
    /// Open (or create) the database and report through `on_loaded`
    fn open(&self, name: &str, options: EngineOptions, on_loaded: LoadedCallback);

    /// Look up a collection by name
    fn get_collection(&self, name: &str) -> Option<CollectionHandle>;

    /// Create a collection; returns the existing one if the name is taken
    fn add_collection(&self, name: &str, options: CollectionOptions) -> Result<CollectionHandle>;

    /// Save the whole database and report through `on_done`
    fn save_database(&self, on_done: SaveCallback);

    /// Names of all collections, sorted
    fn collection_names(&self) -> Vec<String>;

    /// Stop background work. Idempotent.
    fn close(&self);
}
