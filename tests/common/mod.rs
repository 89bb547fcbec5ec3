//! Shared helpers for integration tests.

#![allow(dead_code)]

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::Method;
use resource_runtime::dispatch::EntityBody;
use resource_runtime::{Application, RequestContext, Resource, ResponseDescriptor, RuntimeConfig};

/// Build an application with default configuration.
pub fn app(resources: Vec<Resource>) -> Application {
    app_with(&RuntimeConfig::default(), resources)
}

/// Build an application with `config`.
pub fn app_with(config: &RuntimeConfig, resources: Vec<Resource>) -> Application {
    Application::builder(config)
        .resources(resources)
        .build()
        .expect("resource model should be valid")
}

pub fn request(method: Method, uri: &str) -> RequestContext {
    RequestContext::new(method, uri)
}

pub fn get(uri: &str) -> RequestContext {
    request(Method::GET, uri)
}

pub fn content_type(response: &ResponseDescriptor) -> Option<String> {
    header(response, CONTENT_TYPE.as_str())
}

pub fn allow(response: &ResponseDescriptor) -> Option<String> {
    header(response, ALLOW.as_str())
}

pub fn header(response: &ResponseDescriptor, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The entity written as text with the response's media type.
pub fn body_text(response: &ResponseDescriptor) -> Option<String> {
    let entity = response.get_entity()?;
    let media_type = response.media_type().unwrap_or_else(|| entity.default_media_type());
    match entity.body() {
        EntityBody::Value(value) => {
            let bytes = value.write_to(&media_type).ok()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        EntityBody::Stream(_) => None,
    }
}
