//! Completion handles
//!
//! The future a caller gets back from `Scheduler::enqueue`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::{Result, StoreError};

/// Cloneable completion; every clone resolves to the same outcome
pub type SharedCompletion<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Resolves with the outcome of one unit of work
///
/// Dropping a `Completion` does not cancel its unit; the unit still runs in
/// its place on the chain.
#[must_use = "a completion does nothing unless awaited; the unit runs either way"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    /// Convert into a handle any number of callers can await
    pub fn shared(self) -> SharedCompletion<T> {
        self.boxed().shared()
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without reporting: the chain went away mid-unit.
            Poll::Ready(Err(_)) => Poll::Ready(Err(StoreError::CompletionDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}
