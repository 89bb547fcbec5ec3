//! Handler invocation and result normalization.
//!
//! # Responsibilities
//! - Invoke the selected binding's handler with the request context
//! - Normalize its result into a `DispatchOutcome` using the binding's
//!   return shape
//! - Keep argument, mechanism and handler failures apart
//!
//! # Data Flow
//! ```text
//! binding ──▶ Handler::call ──▶ HandlerValue
//!                                   │
//!             ┌─────────────────────┼──────────────────────┐
//!             ▼                     ▼                      ▼
//!        Empty/Entity/Response   Pending (ready)      Pending (not ready)
//!             │                     │                      │
//!             └──── normalize ◀─────┘                 Deferred
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::task::noop_waker_ref;

use crate::dispatch::error::{HandlerError, InvokeError};
use crate::dispatch::extract::InvocationScope;
use crate::dispatch::handler::Handler;
use crate::dispatch::outcome::{DispatchOutcome, Entity, ResponseDescriptor};
use crate::dispatch::pending::{panic_message, Deferred, ValueFuture};
use crate::dispatch::responder::{HandlerValue, ReturnShape};
use crate::http::request::RequestContext;

/// Invokes handlers and normalizes what they return.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Invoke `handler` for `ctx` and normalize the result.
    ///
    /// Never blocks: unfinished asynchronous work is returned as
    /// `DispatchOutcome::Deferred`.
    pub fn dispatch(&self, handler: &dyn Handler, ctx: &RequestContext) -> Result<DispatchOutcome, InvokeError> {
        let shape = handler.shape();
        let start = Instant::now();
        let mut scope = InvocationScope::new();

        let result = match catch_unwind(AssertUnwindSafe(|| handler.call(ctx, &mut scope))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(request_id = %ctx.request_id(), %message, "Handler panicked");
                Err(InvokeError::Handler(HandlerError::panicked(message)))
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            shape = %shape,
            elapsed_us = start.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Handler invoked"
        );

        let value = match result {
            Ok(value) => value,
            Err(InvokeError::Handler(error)) => return normalize_completed(shape, Err(error)),
            Err(other) => return Err(other),
        };

        if shape == ReturnShape::Sink {
            return Ok(finish_sink(&mut scope));
        }

        match value {
            HandlerValue::Pending(future) => poll_once(future, shape),
            other => normalize_completed(shape, Ok(other)),
        }
    }
}

/// Flush the sink the handler wrote to and hand it out as the entity.
fn finish_sink(scope: &mut InvocationScope) -> DispatchOutcome {
    let sink = scope.sink();
    if sink.flush().is_err() {
        tracing::debug!("Sink closed before final flush");
    }
    DispatchOutcome::Entity(Entity::stream(sink))
}

/// Unwrap a pending value that is already complete; defer it otherwise.
fn poll_once(mut future: ValueFuture, shape: ReturnShape) -> Result<DispatchOutcome, InvokeError> {
    let mut cx = Context::from_waker(noop_waker_ref());
    loop {
        let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        let result = match polled {
            Ok(Poll::Pending) => return Ok(DispatchOutcome::Deferred(Deferred::new(future, shape))),
            Ok(Poll::Ready(result)) => result,
            Err(panic) => Err(HandlerError::panicked(panic_message(panic.as_ref()))),
        };
        match result {
            Ok(HandlerValue::Pending(next)) => future = next,
            other => return normalize_completed(shape, other),
        }
    }
}

/// Normalize a completed (non-pending) result.
///
/// A cancelled computation becomes a 503 response rather than an error.
pub(crate) fn normalize_completed(
    shape: ReturnShape,
    result: Result<HandlerValue, HandlerError>,
) -> Result<DispatchOutcome, InvokeError> {
    let value = match result {
        Ok(value) => value,
        Err(error) if error.is_cancelled() => {
            return Ok(DispatchOutcome::Response(ResponseDescriptor::new(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
            )))
        }
        Err(error) => return Err(InvokeError::Handler(error)),
    };

    Ok(match (shape, value) {
        (ReturnShape::Void, _) | (_, HandlerValue::Empty) => DispatchOutcome::NoContent,
        (_, HandlerValue::Response(response)) => DispatchOutcome::Response(response),
        (_, HandlerValue::Entity(entity)) => DispatchOutcome::Entity(entity),
        (_, HandlerValue::Pending(future)) => DispatchOutcome::Deferred(Deferred::new(future, shape)),
    })
}
