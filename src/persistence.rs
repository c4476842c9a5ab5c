//! Persistence Scheduler
//!
//! Explicit "flush to durable storage" units.
//!
//! The engine also autosaves on its own interval; that is best-effort.
//! `persist` is the deterministic signal: when its completion resolves, every
//! unit enqueued before it has been applied and saved.

use std::sync::Arc;
use std::time::Duration;

use crate::callback;
use crate::engine::StorageEngine;
use crate::error::StoreError;
use crate::scheduler::{Completion, Scheduler};

/// Enqueues explicit saves on the store's chain
#[derive(Clone)]
pub struct PersistenceScheduler {
    engine: Arc<dyn StorageEngine>,
    scheduler: Scheduler,
    callback_timeout: Option<Duration>,
}

impl PersistenceScheduler {
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        scheduler: Scheduler,
        callback_timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            scheduler,
            callback_timeout,
        }
    }

    /// Save once every previously enqueued unit has finished
    ///
    /// A failed save fails only this completion; the chain moves on.
    pub fn persist(&self) -> Completion<()> {
        let engine = Arc::clone(&self.engine);
        let timeout = self.callback_timeout;

        self.scheduler.enqueue("persist", move || async move {
            let (on_done, done) = callback::channel();
            engine.save_database(on_done);

            match callback::wait("save", done, timeout).await {
                Ok(()) => {
                    tracing::debug!("Store persisted");
                    Ok(())
                }
                Err(StoreError::Save(reason)) => {
                    tracing::warn!("Persist failed: {}", reason);
                    Err(StoreError::Save(reason))
                }
                Err(e) => {
                    tracing::warn!("Persist failed: {}", e);
                    Err(StoreError::Save(e.to_string()))
                }
            }
        })
    }
}
