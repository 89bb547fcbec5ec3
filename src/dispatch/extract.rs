//! Handler arguments taken from the request.
//!
//! Every argument type names its `ParamSource`; the source decides the
//! status of a failed conversion (404 for path and query values, 400 for
//! headers and entities, 500 for values the framework should have
//! supplied).

use std::str::FromStr;
use std::sync::Arc;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::dispatch::error::{ArgumentError, ParamSource};
use crate::dispatch::outcome::Json;
use crate::dispatch::sink::Sink;
use crate::http::request::{PathParams, RequestContext};

/// Per-invocation state shared by extractors.
#[derive(Debug, Default)]
pub struct InvocationScope {
    sink: Option<Sink>,
}

impl InvocationScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sink for this invocation, created on first use.
    pub fn sink(&mut self) -> Sink {
        self.sink.get_or_insert_with(Sink::new).clone()
    }

    pub fn take_sink(&mut self) -> Option<Sink> {
        self.sink.take()
    }
}

/// A value that can be produced from the request for a handler argument.
pub trait FromRequest: Sized + Send + 'static {
    const SOURCE: ParamSource;

    fn from_request(ctx: &RequestContext, scope: &mut InvocationScope) -> Result<Self, ArgumentError>;
}

impl FromRequest for PathParams {
    const SOURCE: ParamSource = ParamSource::Path;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        Ok(ctx.path_params().clone())
    }
}

/// The most recently bound template variable, converted with `FromStr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path<T>(pub T);

impl<T> FromRequest for Path<T>
where
    T: FromStr + Send + 'static,
    T::Err: std::fmt::Display,
{
    const SOURCE: ParamSource = ParamSource::Path;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        let (name, value) = ctx
            .path_params()
            .last()
            .ok_or_else(|| ArgumentError::new(ParamSource::Path, "no template variable bound"))?;
        value
            .parse()
            .map(Path)
            .map_err(|e: T::Err| ArgumentError::named(ParamSource::Path, name, e.to_string()))
    }
}

/// Decoded query string pairs, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for `name`, converted. A missing value is `Ok(None)`.
    pub fn get_as<T>(&self, name: &str) -> Result<Option<T>, ArgumentError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|v| {
                v.parse()
                    .map_err(|e: T::Err| ArgumentError::named(ParamSource::Query, name, e.to_string()))
            })
            .transpose()
    }
}

impl FromRequest for QueryParams {
    const SOURCE: ParamSource = ParamSource::Query;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        Ok(ctx.query().map(QueryParams::parse).unwrap_or_default())
    }
}

impl FromRequest for HeaderMap {
    const SOURCE: ParamSource = ParamSource::Header;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        Ok(ctx.headers().clone())
    }
}

impl FromRequest for Bytes {
    const SOURCE: ParamSource = ParamSource::Entity;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        Ok(ctx.body().clone())
    }
}

impl FromRequest for String {
    const SOURCE: ParamSource = ParamSource::Entity;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        String::from_utf8(ctx.body().to_vec())
            .map_err(|e| ArgumentError::new(ParamSource::Entity, e.to_string()))
    }
}

impl<T> FromRequest for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    const SOURCE: ParamSource = ParamSource::Entity;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        serde_json::from_slice(ctx.body())
            .map(Json)
            .map_err(|e| ArgumentError::new(ParamSource::Entity, e.to_string()))
    }
}

/// A value the application attached to every request.
#[derive(Debug, Clone)]
pub struct Extension<T>(pub T);

impl<T> FromRequest for Extension<T>
where
    T: Clone + Send + Sync + 'static,
{
    const SOURCE: ParamSource = ParamSource::Extension;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        ctx.extensions()
            .get::<T>()
            .cloned()
            .map(Extension)
            .ok_or_else(|| {
                ArgumentError::new(
                    ParamSource::Extension,
                    format!("no extension of type {}", std::any::type_name::<T>()),
                )
            })
    }
}

/// The sub-resource instance the last locator returned.
#[derive(Debug)]
pub struct Instance<T>(pub Arc<T>);

impl<T> FromRequest for Instance<T>
where
    T: Send + Sync + 'static,
{
    const SOURCE: ParamSource = ParamSource::Resource;

    fn from_request(ctx: &RequestContext, _: &mut InvocationScope) -> Result<Self, ArgumentError> {
        let missing = || {
            ArgumentError::new(
                ParamSource::Resource,
                format!("no resource instance of type {}", std::any::type_name::<T>()),
            )
        };
        let instance = ctx.resource().cloned().ok_or_else(missing)?;
        instance.downcast::<T>().map(Instance).map_err(|_| missing())
    }
}

impl FromRequest for Sink {
    const SOURCE: ParamSource = ParamSource::Sink;

    fn from_request(_: &RequestContext, scope: &mut InvocationScope) -> Result<Self, ArgumentError> {
        Ok(scope.sink())
    }
}
