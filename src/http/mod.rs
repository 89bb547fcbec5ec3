//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, trace, body limit)
//!     → request.rs (RequestContext: method, path, headers, entity)
//!     → Application::handle (routing, dispatch)
//!     → response.rs (ResponseDescriptor → axum Response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{PathParams, RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
