//! Resource runtime library.
//!
//! Declarative resources with content negotiation, sub-resource locators
//! and normalized handler results, served over axum.

pub mod application;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod media;
pub mod observability;
pub mod routing;

pub use application::{Application, ApplicationBuilder, ErrorMappers, ProcessingError};
pub use config::RuntimeConfig;
pub use dispatch::{DispatchOutcome, HandlerError, Json, Pending, Reply, ResponseDescriptor, Sink};
pub use http::{HttpServer, RequestContext};
pub use lifecycle::Shutdown;
pub use media::{CombinedMediaType, MediaType};
pub use routing::{Binding, Resource, ResourceType, Router, SubResource};
