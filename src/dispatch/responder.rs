//! Handler return types.
//!
//! # Responsibilities
//! - Classify every supported return type into a `ReturnShape` at compile
//!   time (`Responder::SHAPE`)
//! - Convert a returned value into a `HandlerValue` for normalization
//!
//! # Design Decisions
//! - The shape is a property of the handler's signature, not of a returned
//!   value, so it is fixed once when the handler is bound
//! - Envelope types (`Typed`, `Option`, `Result`) keep the shape of what
//!   they wrap

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::dispatch::error::HandlerError;
use crate::dispatch::outcome::{Entity, EntityValue, Json, ResponseDescriptor};
use crate::dispatch::pending::{Pending, ValueFuture};

/// How a binding's results are normalized, chosen when it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// Returns nothing; always 204.
    Void,
    /// Returns a full `ResponseDescriptor`.
    Response,
    /// Returns a `Reply`, decided per call.
    Dynamic,
    /// Returns a value with a static type.
    Typed,
    /// Returns a `Pending` value.
    Async,
    /// Returns nothing but writes to a `Sink` argument.
    Sink,
}

impl ReturnShape {
    /// Shape of a handler returning `returned`, with or without a sink
    /// argument.
    pub const fn select(returned: ReturnShape, takes_sink: bool) -> ReturnShape {
        match (returned, takes_sink) {
            (ReturnShape::Void, true) => ReturnShape::Sink,
            (shape, _) => shape,
        }
    }
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnShape::Void => "void",
            ReturnShape::Response => "response",
            ReturnShape::Dynamic => "dynamic",
            ReturnShape::Typed => "typed",
            ReturnShape::Async => "async",
            ReturnShape::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// A returned value before normalization.
pub enum HandlerValue {
    Empty,
    Response(ResponseDescriptor),
    Entity(Entity),
    Pending(ValueFuture),
}

/// A handler return type.
pub trait Responder: Send + 'static {
    /// Shape shared by every value of this type.
    const SHAPE: ReturnShape;

    fn into_value(self) -> Result<HandlerValue, HandlerError>;
}

/// A result whose kind is only known at run time.
pub enum Reply {
    Empty,
    Response(ResponseDescriptor),
    Entity(Entity),
}

impl Reply {
    pub fn entity<T: EntityValue>(value: T) -> Self {
        Reply::Entity(Entity::new(value))
    }
}

impl From<ResponseDescriptor> for Reply {
    fn from(response: ResponseDescriptor) -> Self {
        Reply::Response(response)
    }
}

/// Envelope that only carries static type information.
///
/// Unwrapped transparently: `Typed<T>` behaves exactly as `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typed<T>(pub T);

impl<T> Typed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Responder for () {
    const SHAPE: ReturnShape = ReturnShape::Void;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        Ok(HandlerValue::Empty)
    }
}

impl Responder for ResponseDescriptor {
    const SHAPE: ReturnShape = ReturnShape::Response;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        Ok(HandlerValue::Response(self))
    }
}

impl Responder for Reply {
    const SHAPE: ReturnShape = ReturnShape::Dynamic;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        Ok(match self {
            Reply::Empty => HandlerValue::Empty,
            Reply::Response(response) => HandlerValue::Response(response),
            Reply::Entity(entity) => HandlerValue::Entity(entity),
        })
    }
}

macro_rules! typed_responder {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Responder for $ty {
                const SHAPE: ReturnShape = ReturnShape::Typed;

                fn into_value(self) -> Result<HandlerValue, HandlerError> {
                    Ok(HandlerValue::Entity(Entity::new(self)))
                }
            }
        )*
    };
}

typed_responder!(String, &'static str, Vec<u8>, Bytes, serde_json::Value);

impl<T> Responder for Json<T>
where
    T: Serialize + Send + Sync + 'static,
{
    const SHAPE: ReturnShape = ReturnShape::Typed;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        Ok(HandlerValue::Entity(Entity::new(self)))
    }
}

impl<T: Responder> Responder for Typed<T> {
    const SHAPE: ReturnShape = T::SHAPE;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        self.0.into_value()
    }
}

/// `None` is an absent entity: 204.
impl<T: Responder> Responder for Option<T> {
    const SHAPE: ReturnShape = T::SHAPE;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        match self {
            Some(value) => value.into_value(),
            None => Ok(HandlerValue::Empty),
        }
    }
}

impl<T, E> Responder for Result<T, E>
where
    T: Responder,
    E: Into<HandlerError> + Send + 'static,
{
    const SHAPE: ReturnShape = T::SHAPE;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        match self {
            Ok(value) => value.into_value(),
            Err(error) => Err(error.into()),
        }
    }
}

impl<T: Responder> Responder for Pending<T> {
    const SHAPE: ReturnShape = ReturnShape::Async;

    fn into_value(self) -> Result<HandlerValue, HandlerError> {
        let future = self.into_boxed();
        Ok(HandlerValue::Pending(Box::pin(async move {
            let value = future.await?;
            value.into_value()
        })))
    }
}
