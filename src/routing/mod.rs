//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Resource[] (resource.rs, declarative model)
//!     → tree.rs (parse templates and media types, merge, validate, sort)
//!     → Freeze as immutable RouteNode tree inside Router
//!
//! Per request:
//!     RequestContext (path, method, headers)
//!     → router.rs (depth-first template match, path params recorded)
//!     → locator.rs (sub-resource expansion, cached per locator node)
//!     → selector.rs (method, Content-Type, Accept negotiation)
//!     → Route::Handler(Selection) or Route::Options, or RoutingError
//! ```
//!
//! # Design Decisions
//! - The static tree never changes after startup
//! - Only locator results are built at runtime, and only those are cached
//! - Deterministic: the same request and model always select the same
//!   binding

pub mod error;
pub mod locator;
pub mod resource;
pub mod router;
pub mod selector;
pub mod template;
pub mod tree;

pub use error::{ModelError, RoutingError};
pub use locator::{
    CacheAge, CachePolicy, CacheStats, LocatorCache, ResourceType, SubResource, DEFAULT_CACHE_SIZE,
};
pub use resource::{Binding, Locator, Resource};
pub use router::{Router, RouterOptions};
pub use selector::{Route, Selection};
pub use template::{PathTemplate, TemplateError};
pub use tree::{BuildOptions, MethodBinding, NodeId, RouteNode};
