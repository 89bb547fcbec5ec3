//! Normalized handler results.
//!
//! # Responsibilities
//! - `Entity`: a response body value tagged with its static type
//! - `ResponseDescriptor`: status, headers and optional entity
//! - `DispatchOutcome`: the single shape every handler result becomes
//!
//! # Design Decisions
//! - Entities stay typed until the transport writes them, so the negotiated
//!   media type picks the representation
//! - The static type is recorded when the entity is created; the response
//!   writer never has to guess it from the value

use std::any::{type_name, Any, TypeId};
use std::fmt;

use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::pending::Deferred;
use crate::dispatch::sink::Sink;
use crate::media::MediaType;

/// Failure turning an entity into bytes.
#[derive(Debug, Error)]
#[error("cannot write {type_name} as {media_type}: {message}")]
pub struct WriteError {
    pub type_name: &'static str,
    pub media_type: String,
    pub message: String,
}

#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A value that can be written as a response body.
pub trait EntityValue: AsAny + Send + Sync + 'static {
    /// Serialize for the negotiated media type.
    fn write_to(&self, media_type: &MediaType) -> Result<Bytes, WriteError>;

    /// Media type used when negotiation left a wildcard.
    fn default_media_type(&self) -> MediaType {
        MediaType::octet_stream()
    }
}

impl EntityValue for String {
    fn write_to(&self, _: &MediaType) -> Result<Bytes, WriteError> {
        Ok(Bytes::from(self.clone()))
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::text_plain()
    }
}

impl EntityValue for &'static str {
    fn write_to(&self, _: &MediaType) -> Result<Bytes, WriteError> {
        Ok(Bytes::from_static(self.as_bytes()))
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::text_plain()
    }
}

impl EntityValue for Vec<u8> {
    fn write_to(&self, _: &MediaType) -> Result<Bytes, WriteError> {
        Ok(Bytes::from(self.clone()))
    }
}

impl EntityValue for Bytes {
    fn write_to(&self, _: &MediaType) -> Result<Bytes, WriteError> {
        Ok(self.clone())
    }
}

impl EntityValue for serde_json::Value {
    fn write_to(&self, media_type: &MediaType) -> Result<Bytes, WriteError> {
        write_json::<Self>(self, media_type)
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::application_json()
    }
}

/// A serde value rendered as JSON. Also usable as a request extractor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> EntityValue for Json<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn write_to(&self, media_type: &MediaType) -> Result<Bytes, WriteError> {
        write_json::<T>(&self.0, media_type)
    }

    fn default_media_type(&self) -> MediaType {
        MediaType::application_json()
    }
}

fn write_json<T: Serialize>(value: &T, media_type: &MediaType) -> Result<Bytes, WriteError> {
    serde_json::to_vec(value).map(Bytes::from).map_err(|e| WriteError {
        type_name: type_name::<T>(),
        media_type: media_type.to_string(),
        message: e.to_string(),
    })
}

/// Identity of the static type an entity was created from.
#[derive(Clone, Copy)]
pub struct StaticType {
    id: TypeId,
    name: &'static str,
}

impl StaticType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for StaticType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StaticType {}

impl fmt::Debug for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Payload of an entity.
pub enum EntityBody {
    Value(Box<dyn EntityValue>),
    Stream(Sink),
}

/// A response body together with its static type.
pub struct Entity {
    body: EntityBody,
    declared: StaticType,
}

impl Entity {
    pub fn new<T: EntityValue>(value: T) -> Self {
        Self {
            body: EntityBody::Value(Box::new(value)),
            declared: StaticType::of::<T>(),
        }
    }

    /// Entity whose chunks arrive through a sink.
    pub fn stream(sink: Sink) -> Self {
        Self {
            body: EntityBody::Stream(sink),
            declared: StaticType::of::<Sink>(),
        }
    }

    pub fn declared_type(&self) -> StaticType {
        self.declared
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.declared.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match &self.body {
            EntityBody::Value(value) => {
                let value: &dyn EntityValue = value.as_ref();
                value.as_any().downcast_ref::<T>()
            }
            EntityBody::Stream(_) => None,
        }
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub fn into_body(self) -> EntityBody {
        self.body
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.body, EntityBody::Stream(_))
    }

    /// Media type to use when negotiation produced only a wildcard.
    pub fn default_media_type(&self) -> MediaType {
        match &self.body {
            EntityBody::Value(value) => value.default_media_type(),
            EntityBody::Stream(_) => MediaType::octet_stream(),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_stream() { "stream" } else { "value" };
        f.debug_struct("Entity")
            .field("type", &self.declared)
            .field("body", &kind)
            .finish()
    }
}

/// A complete response the handler built itself.
#[derive(Debug)]
pub struct ResponseDescriptor {
    status: StatusCode,
    headers: HeaderMap,
    entity: Option<Entity>,
}

impl ResponseDescriptor {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            entity: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// 201 with a `Location` header.
    pub fn created(location: &str) -> Self {
        Self::new(StatusCode::CREATED).header(LOCATION, location)
    }

    /// Set a header. Values that are not valid header text are dropped.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn entity<T: EntityValue>(mut self, value: T) -> Self {
        self.entity = Some(Entity::new(value));
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn get_entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub fn take_entity(&mut self) -> Option<Entity> {
        self.entity.take()
    }

    /// Content type set by the handler or by negotiation.
    pub fn media_type(&self) -> Option<MediaType> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Option<Entity>) {
        (self.status, self.headers, self.entity)
    }
}

/// The uniform result of one dispatch.
pub enum DispatchOutcome {
    /// The handler produced nothing: 204.
    NoContent,
    /// A bare entity: 200 with the negotiated type.
    Entity(Entity),
    /// A response the handler built.
    Response(ResponseDescriptor),
    /// The result is not available yet.
    Deferred(Deferred),
}

impl DispatchOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, DispatchOutcome::Deferred(_))
    }

    /// Materialize a non-deferred outcome as a response.
    ///
    /// Returns the outcome unchanged if it is still deferred.
    pub fn into_response(self) -> Result<ResponseDescriptor, Deferred> {
        match self {
            DispatchOutcome::NoContent => Ok(ResponseDescriptor::no_content()),
            DispatchOutcome::Entity(entity) => Ok(ResponseDescriptor::ok().with_entity(entity)),
            DispatchOutcome::Response(response) => Ok(response),
            DispatchOutcome::Deferred(deferred) => Err(deferred),
        }
    }
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::NoContent => f.write_str("NoContent"),
            DispatchOutcome::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            DispatchOutcome::Response(response) => f.debug_tuple("Response").field(response).finish(),
            DispatchOutcome::Deferred(_) => f.write_str("Deferred"),
        }
    }
}
