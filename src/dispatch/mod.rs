//! Handler invocation.
//!
//! # Responsibilities
//! - Turn functions into type-erased handlers with extracted arguments
//! - Invoke the selected handler and normalize every return shape into a
//!   single `DispatchOutcome`
//! - Separate argument conversion failures, invocation faults and
//!   handler-raised errors
//!
//! # Design Decisions
//! - The return shape is computed once per binding, when it is bound
//! - Asynchronous results never block the dispatching thread
//! - Streaming handlers write to a `Sink` argument and return nothing

pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod handler;
pub mod outcome;
pub mod pending;
pub mod responder;
pub mod sink;

pub use dispatcher::Dispatcher;
pub use error::{ArgumentError, HandlerError, InvokeError, ParamSource};
pub use extract::{Extension, FromRequest, Instance, InvocationScope, Path, QueryParams};
pub use handler::{Handler, IntoHandler};
pub use outcome::{
    DispatchOutcome, Entity, EntityBody, EntityValue, Json, ResponseDescriptor, StaticType, WriteError,
};
pub use pending::{channel, Completer, Deferred, Pending};
pub use responder::{HandlerValue, Reply, Responder, ReturnShape, Typed};
pub use sink::{Sink, SinkClosed};
