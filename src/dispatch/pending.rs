//! Deferred handler results.
//!
//! # Responsibilities
//! - `Pending<T>`: what a handler returns when its value arrives later
//! - `Completer<T>`: the producing half for callback-style code
//! - `Deferred`: a dispatch outcome still waiting on its value
//!
//! # Design Decisions
//! - A pending value that is already complete at dispatch time is unwrapped
//!   on the spot; only genuinely unfinished work becomes `Deferred`
//! - Cancellation (completer dropped or cancelled) becomes 503, never a hang
//! - Panics inside the deferred computation are caught and reported as
//!   handler errors

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::dispatch::error::{HandlerError, InvokeError};
use crate::dispatch::outcome::DispatchOutcome;
use crate::dispatch::responder::{HandlerValue, ReturnShape};

/// A value a handler will produce asynchronously.
pub struct Pending<T> {
    future: BoxFuture<'static, Result<T, HandlerError>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Wrap any future that yields the value or a handler error.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// A computation that has already finished.
    pub fn ready(value: T) -> Self {
        Self::new(std::future::ready(Ok(value)))
    }

    /// A computation that has already failed.
    pub fn failed(error: HandlerError) -> Self {
        Self::new(std::future::ready(Err(error)))
    }

    /// A computation that was cancelled before it produced a value.
    pub fn cancelled() -> Self {
        Self::failed(HandlerError::cancelled())
    }

    pub(crate) fn into_boxed(self) -> BoxFuture<'static, Result<T, HandlerError>> {
        self.future
    }
}

/// Producing half of a `Pending` created by [`channel`].
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T, HandlerError>>,
}

impl<T> Completer<T> {
    /// Deliver the value. Returns false if nobody is waiting any more.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Deliver an error instead of a value.
    pub fn fail(self, error: HandlerError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Cancel the computation; the client gets 503.
    pub fn cancel(self) -> bool {
        self.fail(HandlerError::cancelled())
    }

    /// True once the waiting side has gone away.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a pending value completed from elsewhere.
///
/// Dropping the completer without completing counts as cancellation.
pub fn channel<T: Send + 'static>() -> (Completer<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    let pending = Pending::new(async move {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::cancelled()),
        }
    });
    (Completer { tx }, pending)
}

pub(crate) type ValueFuture = BoxFuture<'static, Result<HandlerValue, HandlerError>>;

/// A dispatch outcome whose value is not available yet.
pub struct Deferred {
    future: ValueFuture,
    shape: ReturnShape,
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("shape", &self.shape).finish_non_exhaustive()
    }
}

impl Deferred {
    pub(crate) fn new(future: ValueFuture, shape: ReturnShape) -> Self {
        Self { future, shape }
    }

    /// Return shape of the binding that produced this outcome.
    pub fn shape(&self) -> ReturnShape {
        self.shape
    }

    /// Wait for the value and normalize it like a synchronous result.
    pub async fn complete(self) -> Result<DispatchOutcome, InvokeError> {
        let shape = self.shape;
        let mut future = self.future;
        loop {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(HandlerError::panicked(panic_message(panic.as_ref()))),
            };
            match result {
                Ok(HandlerValue::Pending(next)) => future = next,
                other => return crate::dispatch::dispatcher::normalize_completed(shape, other),
            }
        }
    }

    /// Like [`Deferred::complete`], but gives up after `timeout` with 503.
    pub async fn complete_within(self, timeout: Duration) -> Result<DispatchOutcome, InvokeError> {
        match tokio::time::timeout(timeout, self.complete()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Deferred result timed out");
                crate::dispatch::dispatcher::normalize_completed(
                    ReturnShape::Async,
                    Err(HandlerError::cancelled()),
                )
            }
        }
    }

    /// Run the completion on the runtime and hand the result to `callback`.
    ///
    /// The callback runs on a runtime worker, usually not the caller's thread.
    pub fn on_complete<F>(self, callback: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Result<DispatchOutcome, InvokeError>) + Send + 'static,
    {
        tokio::spawn(async move {
            callback(self.complete().await);
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
