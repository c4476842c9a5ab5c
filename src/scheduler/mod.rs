//! Scheduler Module
//!
//! The single chain every store operation runs on.
//!
//! ## Guarantees
//! - FIFO: units run in the order `enqueue` was called
//! - At most one unit in flight; a unit starts only after its predecessor
//!   has completed, failed, or panicked
//! - `enqueue` is synchronous and callable from any thread; it is the only
//!   synchronization point
//!
//! ## Design
//! ```text
//!   enqueue ──► [ seq + send under one mutex ] ──► unbounded channel
//!                                                        │
//!                                             chain loop (tokio task)
//!                                                        │
//!                                    run unit ─► report ─► next unit
//! ```
//!
//! The channel is the chain: its tail is the last unit sent, and the loop
//! pulling from its head is the only place units execute.

mod completion;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::config::FailurePolicy;
use crate::error::{Result, StoreError};

pub use completion::{Completion, SharedCompletion};

/// What the chain loop tells a unit when its turn comes
enum Gate {
    Run,
    Reject(StoreError),
}

/// A type-erased unit of work; resolves to `true` on success
type Job = Box<dyn FnOnce(Gate) -> BoxFuture<'static, bool> + Send>;

struct Unit {
    seq: u64,
    label: &'static str,
    job: Job,
}

struct SchedulerInner {
    /// `None` once shut down
    tail: Mutex<Option<mpsc::UnboundedSender<Unit>>>,
    next_seq: AtomicU64,
    pending: Arc<AtomicUsize>,
    policy: FailurePolicy,
}

/// Serializes units of work onto one chain
///
/// Cheap to clone; clones share the chain.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Start a chain on the current tokio runtime
    pub fn new(policy: FailurePolicy) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            StoreError::Config(format!("scheduler requires a tokio runtime: {}", e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        runtime.spawn(run_chain(rx, policy, Arc::clone(&pending)));

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                tail: Mutex::new(Some(tx)),
                next_seq: AtomicU64::new(1),
                pending,
                policy,
            }),
        })
    }

    /// Append a unit to the chain
    ///
    /// `work` is not called until every previously enqueued unit has
    /// finished. Its outcome is delivered through the returned
    /// `Completion`, and only there.
    pub fn enqueue<T, F, Fut>(&self, label: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move |gate| match gate {
            Gate::Run => async move {
                let outcome = match AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(payload) => Err(StoreError::UnitPanicked(panic_message(payload.as_ref()))),
                };
                let ok = outcome.is_ok();
                let _ = tx.send(outcome);
                ok
            }
            .boxed(),
            Gate::Reject(err) => {
                let _ = tx.send(Err(err));
                future::ready(false).boxed()
            }
        });

        let tail = self.inner.tail.lock();
        let Some(sender) = tail.as_ref() else {
            drop(tail);
            let _ = job(Gate::Reject(StoreError::SchedulerClosed));
            return Completion::new(rx);
        };

        // Sequence assignment and send happen under the same lock, so the
        // channel order is the sequence order.
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        if let Err(mpsc::error::SendError(unit)) = sender.send(Unit { seq, label, job }) {
            drop(tail);
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(seq, label, "Chain loop is gone, rejecting unit");
            let _ = (unit.job)(Gate::Reject(StoreError::SchedulerClosed));
        }

        Completion::new(rx)
    }

    /// A completion that resolves once every unit enqueued before it is done
    pub fn barrier(&self) -> Completion<()> {
        self.enqueue("barrier", || async { Ok(()) })
    }

    /// Units enqueued but not yet finished
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Total units ever accepted onto the chain
    pub fn enqueued(&self) -> u64 {
        self.inner.next_seq.load(Ordering::SeqCst) - 1
    }

    /// Failure policy the chain runs with
    pub fn policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.tail.lock().is_none()
    }

    /// Stop accepting units
    ///
    /// Units already on the chain still run; later `enqueue` calls resolve
    /// with `SchedulerClosed`.
    pub fn shutdown(&self) {
        if self.inner.tail.lock().take().is_some() {
            tracing::debug!("Scheduler shut down");
        }
    }
}

/// The chain loop: one unit at a time, in arrival order
async fn run_chain(
    mut rx: mpsc::UnboundedReceiver<Unit>,
    policy: FailurePolicy,
    pending: Arc<AtomicUsize>,
) {
    let mut aborted = false;

    while let Some(unit) = rx.recv().await {
        let gate = if aborted {
            Gate::Reject(StoreError::ChainAborted)
        } else {
            Gate::Run
        };

        tracing::trace!(seq = unit.seq, label = unit.label, "Running unit");
        let ok = (unit.job)(gate).await;
        pending.fetch_sub(1, Ordering::SeqCst);

        if !ok && !aborted {
            tracing::warn!(seq = unit.seq, label = unit.label, "Unit failed");
            if policy == FailurePolicy::AbortRemaining {
                tracing::warn!("Aborting remaining units on the chain");
                aborted = true;
            }
        }
    }

    tracing::debug!("Chain loop finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
