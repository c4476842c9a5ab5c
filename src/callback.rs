//! Engine callback adapter
//!
//! Turns the engine's one-shot completion callbacks into futures.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Result, StoreError};

/// Boxed callback paired with the receiver it reports to
pub(crate) fn channel<T: Send + 'static>() -> (
    Box<dyn FnOnce(Result<T>) + Send + 'static>,
    oneshot::Receiver<Result<T>>,
) {
    let (tx, rx) = oneshot::channel();
    let callback = Box::new(move |result: Result<T>| {
        // Receiver gone means the waiter timed out; nothing left to notify.
        let _ = tx.send(result);
    });
    (callback, rx)
}

/// Wait for a callback to fire, bounded by `timeout` when one is set
pub(crate) async fn wait<T>(
    operation: &'static str,
    rx: oneshot::Receiver<Result<T>>,
    timeout: Option<Duration>,
) -> Result<T> {
    let received = match timeout {
        Some(after) => tokio::time::timeout(after, rx)
            .await
            .map_err(|_| StoreError::CallbackTimeout { operation, after })?,
        None => rx.await,
    };

    // A dropped sender means the engine discarded the callback uncalled.
    received.map_err(|_| StoreError::CompletionDropped)?
}
