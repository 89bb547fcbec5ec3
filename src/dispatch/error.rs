//! Invocation error taxonomy.
//!
//! Three kinds of failure reach the dispatcher and they must stay apart:
//! a request value that could not be converted into a handler argument, a
//! fault in the invocation machinery itself, and an error the handler
//! raised on purpose. Only the last one is offered to error mappers.

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

/// Where a handler argument is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// Bound template variable.
    Path,
    /// URI query string.
    Query,
    /// Request header.
    Header,
    /// Request entity.
    Entity,
    /// Value injected by the application (request extension).
    Extension,
    /// Sub-resource instance returned by a locator.
    Resource,
    /// Streaming output sink.
    Sink,
    /// The whole request context.
    Context,
}

impl ParamSource {
    /// True for sources the framework supplies; a failure there is a
    /// mechanism fault rather than a bad request.
    pub fn is_internal(self) -> bool {
        matches!(self, ParamSource::Extension | ParamSource::Resource | ParamSource::Sink)
    }
}

/// A request value could not be turned into a handler argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot extract {kind:?} parameter{}: {message}", quoted(.name))]
pub struct ArgumentError {
    pub kind: ParamSource,
    pub name: Option<String>,
    pub message: String,
}

impl ArgumentError {
    pub fn new(kind: ParamSource, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            message: message.into(),
        }
    }

    pub fn named(kind: ParamSource, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            message: message.into(),
        }
    }

    /// 404 for path and query values, 400 for headers and entities.
    pub fn status(&self) -> StatusCode {
        match self.kind {
            ParamSource::Path | ParamSource::Query => StatusCode::NOT_FOUND,
            ParamSource::Header | ParamSource::Entity | ParamSource::Context => StatusCode::BAD_REQUEST,
            ParamSource::Extension | ParamSource::Resource | ParamSource::Sink => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn quoted(name: &Option<String>) -> String {
    name.as_ref().map(|n| format!(" '{}'", n)).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerErrorKind {
    Failed,
    Panicked,
    Cancelled,
}

/// An error raised by handler code.
///
/// Any `std::error::Error` converts into it with `?`. It deliberately does
/// not implement `Error` itself so that blanket conversion stays coherent.
pub struct HandlerError {
    source: Box<dyn StdError + Send + Sync + 'static>,
    status: Option<StatusCode>,
    kind: HandlerErrorKind,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

impl HandlerError {
    /// Wrap an application error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            source: Box::new(error),
            status: None,
            kind: HandlerErrorKind::Failed,
        }
    }

    /// An error with only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// An error that already knows its response status.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::msg(message)
        }
    }

    /// The asynchronous computation was cancelled before completing.
    pub fn cancelled() -> Self {
        Self {
            status: Some(StatusCode::SERVICE_UNAVAILABLE),
            kind: HandlerErrorKind::Cancelled,
            ..Self::msg("computation cancelled")
        }
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Panicked,
            ..Self::msg(message)
        }
    }

    /// Explicit status, if the handler chose one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == HandlerErrorKind::Cancelled
    }

    pub fn is_panic(&self) -> bool {
        self.kind == HandlerErrorKind::Panicked
    }

    /// The wrapped application error.
    pub fn source_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        HandlerError::new(error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("source", &self.source)
            .field("status", &self.status)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Failure of one handler invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// A request value could not be converted into an argument.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// The framework could not call the handler at all.
    #[error("invocation failed: {0}")]
    Mechanism(String),

    /// The handler ran and raised an error.
    #[error("handler error: {0}")]
    Handler(HandlerError),
}

impl InvokeError {
    /// Split an extraction failure by who is at fault.
    pub fn from_argument(error: ArgumentError) -> Self {
        if error.kind.is_internal() {
            InvokeError::Mechanism(error.to_string())
        } else {
            InvokeError::Argument(error)
        }
    }

    /// Status used when nothing maps the error to a response.
    pub fn default_status(&self) -> StatusCode {
        match self {
            InvokeError::Argument(e) => e.status(),
            InvokeError::Mechanism(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvokeError::Handler(e) => e.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl From<HandlerError> for InvokeError {
    fn from(error: HandlerError) -> Self {
        InvokeError::Handler(error)
    }
}
