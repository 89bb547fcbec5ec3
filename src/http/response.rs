//! Response conversion for the transport.
//!
//! # Responsibilities
//! - Turn a `ResponseDescriptor` into an axum `Response`
//! - Serialize value entities with the response `Content-Type`
//! - Stream sink entities chunk by chunk
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - An entity that cannot be written for its media type becomes a 500;
//!   the handler already ran, so nothing else can be done

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::dispatch::{EntityBody, ResponseDescriptor};
use crate::media::MediaType;

impl IntoResponse for ResponseDescriptor {
    fn into_response(self) -> Response {
        let media_type = self.media_type().unwrap_or_else(MediaType::octet_stream);
        let (status, mut headers, entity) = self.into_parts();

        let body = match entity.map(|entity| entity.into_body()) {
            None => Body::empty(),
            Some(EntityBody::Value(value)) => match value.write_to(&media_type) {
                Ok(bytes) => Body::from(bytes),
                Err(e) => {
                    tracing::error!(error = %e, media_type = %media_type, "Failed to write entity");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
                }
            },
            Some(EntityBody::Stream(sink)) => {
                headers.remove(CONTENT_LENGTH);
                Body::from_stream(sink.into_stream())
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
