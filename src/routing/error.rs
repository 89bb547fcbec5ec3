//! Routing errors.

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::dispatch::InvokeError;
use crate::media::MediaTypeError;
use crate::routing::template::TemplateError;

/// The resource model is invalid. Raised while building the route tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid media type '{value}' on {method} {path}: {source}")]
    MediaType {
        path: String,
        method: Method,
        value: String,
        #[source]
        source: MediaTypeError,
    },

    #[error("ambiguous bindings for {method} {path}: both consume {consumes} and produce {produces}")]
    Ambiguous {
        path: String,
        method: Method,
        consumes: String,
        produces: String,
    },

    #[error("more than one sub-resource locator on {path}")]
    DuplicateLocator { path: String },
}

/// A request could not be routed to a handler.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no resource matches the request path")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("request media type is not supported")]
    UnsupportedMediaType,

    #[error("no acceptable response media type")]
    NotAcceptable,

    #[error("malformed media type header: {0}")]
    BadHeader(#[source] MediaTypeError),

    #[error("sub-resource locator failed: {0}")]
    Locator(#[source] InvokeError),

    #[error("sub-resource model is invalid: {0}")]
    SubResource(#[source] ModelError),
}

impl RoutingError {
    pub fn status(&self) -> StatusCode {
        match self {
            RoutingError::NotFound => StatusCode::NOT_FOUND,
            RoutingError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            RoutingError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RoutingError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            RoutingError::BadHeader(_) => StatusCode::BAD_REQUEST,
            RoutingError::Locator(e) => e.default_status(),
            RoutingError::SubResource(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RoutingError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            RoutingError::MethodNotAllowed { allowed: vec![Method::GET] }.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(RoutingError::UnsupportedMediaType.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(RoutingError::NotAcceptable.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            RoutingError::Locator(InvokeError::Mechanism("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
