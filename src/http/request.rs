//! The parsed request handed to the runtime core.
//!
//! # Responsibilities
//! - Carry method, path, query, headers, buffered entity and extensions
//! - Expose the Accept and Content-Type headers as parsed media types
//! - Accumulate routing state: bound path variables and sub-resource
//!   instances pushed by locators
//!
//! # Design Decisions
//! - The entity is buffered by the transport adapter before routing
//! - A request ID is taken from `x-request-id` or generated (UUID v4)
//! - Routing state is only mutated by the router; handlers see `&self`

use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use uuid::Uuid;

use crate::media::{parse_accept, AcceptPreference, MediaType, MediaTypeError};

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Path variables bound while matching templates, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    values: Vec<(String, String)>,
}

impl PathParams {
    /// Innermost value bound for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The most recently bound value, whatever its name.
    pub fn last(&self) -> Option<(&str, &str)> {
        self.values.last().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn push(&mut self, name: String, value: String) {
        self.values.push((name, value));
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }
}

/// A request as seen by the router, negotiator and dispatcher.
pub struct RequestContext {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
    request_id: String,
    path_params: PathParams,
    resources: Vec<Arc<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Create a request for `uri` (path plus optional `?query`).
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        Self {
            method,
            path: normalize_path(path),
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
            request_id: Uuid::new_v4().to_string(),
            path_params: PathParams::default(),
            resources: Vec::new(),
        }
    }

    /// Build from the transport's request head and buffered entity.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut ctx = Self::new(parts.method, &uri);
        if let Some(id) = parts.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
            ctx.request_id = id.to_string();
        }
        ctx.headers = parts.headers;
        ctx.extensions = parts.extensions;
        ctx.body = body;
        ctx
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Request path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub(crate) fn path_params_mut(&mut self) -> &mut PathParams {
        &mut self.path_params
    }

    /// The innermost sub-resource instance, if a locator returned one.
    pub fn resource(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.resources.last()
    }

    pub(crate) fn push_resource(&mut self, instance: Arc<dyn Any + Send + Sync>) {
        self.resources.push(instance);
    }

    pub(crate) fn resource_depth(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn truncate_resources(&mut self, depth: usize) {
        self.resources.truncate(depth);
    }

    /// Parsed Accept header; `*/*` when absent.
    pub fn accept(&self) -> Result<Vec<AcceptPreference>, MediaTypeError> {
        let values: Vec<&str> = self
            .headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        parse_accept(values)
    }

    /// Parsed Content-Type header, if any.
    pub fn content_type(&self) -> Result<Option<MediaType>, MediaTypeError> {
        match self.headers.get(header::CONTENT_TYPE) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| MediaTypeError::Parameter("non-ascii content type".into()))?;
                value.parse().map(Some)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("request_id", &self.request_id)
            .field("path_params", &self.path_params)
            .field("resources", &self.resources.len())
            .finish()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
