//! Declarative resource model.
//!
//! # Responsibilities
//! - Describe resources: a path template, method bindings, child resources
//!   and at most one sub-resource locator
//! - Describe bindings: method, handler, consumed and produced media types
//!
//! # Design Decisions
//! - The model is plain data; nothing is validated until the route tree is
//!   built, so a bad template or media type surfaces as one `ModelError`
//! - Models are cheap to clone (handlers and locators are shared)
//!
//! # Example
//! ```ignore
//! Resource::new("items")
//!     .get(list_items)
//!     .bind(Binding::post(create_item).consumes(["application/json"]))
//!     .child(Resource::new("{id}").get(show_item))
//!     .sub_resource("{id}/reviews", |_: &RequestContext| Ok(SubResource::of::<Reviews>()))
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::pending::panic_message;
use crate::dispatch::{Handler, HandlerError, IntoHandler, InvokeError};
use crate::http::request::RequestContext;
use crate::routing::locator::SubResource;

/// A resource: a path template plus what can be done there.
#[derive(Clone, Default)]
pub struct Resource {
    path: String,
    bindings: Vec<Binding>,
    children: Vec<Resource>,
    locator: Option<Locator>,
}

impl Resource {
    /// A resource at `path`, relative to its parent.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// A resource with an empty path. Used for application roots and for
    /// the models returned by locators.
    pub fn root() -> Self {
        Self::default()
    }

    /// The same resource served at `path`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn bind(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn get<H, Args>(self, handler: H) -> Self
    where
        H: IntoHandler<Args>,
    {
        self.bind(Binding::get(handler))
    }

    pub fn post<H, Args>(self, handler: H) -> Self
    where
        H: IntoHandler<Args>,
    {
        self.bind(Binding::post(handler))
    }

    pub fn put<H, Args>(self, handler: H) -> Self
    where
        H: IntoHandler<Args>,
    {
        self.bind(Binding::put(handler))
    }

    pub fn delete<H, Args>(self, handler: H) -> Self
    where
        H: IntoHandler<Args>,
    {
        self.bind(Binding::delete(handler))
    }

    pub fn child(mut self, child: Resource) -> Self {
        self.children.push(child);
        self
    }

    /// Set the locator that serves paths below this resource.
    pub fn locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<SubResource, HandlerError> + Send + Sync + 'static,
    {
        self.locator = Some(Locator::new(locator));
        self
    }

    /// Add a child at `path` whose only job is to locate a sub-resource.
    pub fn sub_resource<F>(self, path: impl Into<String>, locator: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<SubResource, HandlerError> + Send + Sync + 'static,
    {
        self.child(Resource::new(path).locator(locator))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn children(&self) -> &[Resource] {
        &self.children
    }

    pub fn get_locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("bindings", &self.bindings)
            .field("children", &self.children)
            .field("locator", &self.locator.is_some())
            .finish()
    }
}

/// One HTTP method on a resource, bound to a handler.
#[derive(Clone)]
pub struct Binding {
    method: Method,
    handler: Arc<dyn Handler>,
    consumes: Vec<String>,
    produces: Vec<String>,
    name: Option<String>,
}

impl Binding {
    pub fn new<H, Args>(method: Method, handler: H) -> Self
    where
        H: IntoHandler<Args>,
    {
        Self {
            method,
            handler: handler.into_handler(),
            consumes: Vec::new(),
            produces: Vec::new(),
            name: None,
        }
    }

    pub fn get<H: IntoHandler<Args>, Args>(handler: H) -> Self {
        Self::new(Method::GET, handler)
    }

    pub fn post<H: IntoHandler<Args>, Args>(handler: H) -> Self {
        Self::new(Method::POST, handler)
    }

    pub fn put<H: IntoHandler<Args>, Args>(handler: H) -> Self {
        Self::new(Method::PUT, handler)
    }

    pub fn delete<H: IntoHandler<Args>, Args>(handler: H) -> Self {
        Self::new(Method::DELETE, handler)
    }

    pub fn patch<H: IntoHandler<Args>, Args>(handler: H) -> Self {
        Self::new(Method::PATCH, handler)
    }

    /// Request media types this binding accepts. Empty means any.
    pub fn consumes<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes.extend(types.into_iter().map(Into::into));
        self
    }

    /// Response media types, optionally weighted with `qs`. Empty means any.
    pub fn produces<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces.extend(types.into_iter().map(Into::into));
        self
    }

    /// Name used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn consumed(&self) -> &[String] {
        &self.consumes
    }

    pub fn produced(&self) -> &[String] {
        &self.produces
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("method", &self.method)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("shape", &self.handler.shape())
            .field("name", &self.name)
            .finish()
    }
}

type LocatorFn = dyn Fn(&RequestContext) -> Result<SubResource, HandlerError> + Send + Sync;

/// A function that picks the sub-resource serving the rest of the path.
#[derive(Clone)]
pub struct Locator {
    f: Arc<LocatorFn>,
}

impl Locator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<SubResource, HandlerError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Run the locator. Panics are reported as handler errors.
    pub fn locate(&self, ctx: &RequestContext) -> Result<SubResource, InvokeError> {
        match catch_unwind(AssertUnwindSafe(|| (self.f)(ctx))) {
            Ok(result) => result.map_err(InvokeError::Handler),
            Err(panic) => Err(InvokeError::Handler(HandlerError::panicked(panic_message(
                panic.as_ref(),
            )))),
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Locator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ReturnShape;

    #[test]
    fn test_builder() {
        let resource = Resource::new("items")
            .get(|_: &RequestContext| "list")
            .bind(
                Binding::post(|_: &RequestContext| ())
                    .consumes(["application/json"])
                    .produces(["text/plain;qs=0.5"])
                    .named("create"),
            )
            .child(Resource::new("{id}").get(|_: &RequestContext| "one"))
            .sub_resource("{id}/reviews", |_: &RequestContext| {
                Ok(SubResource::model(Resource::root()))
            });

        assert_eq!(resource.path(), "items");
        assert_eq!(resource.bindings().len(), 2);
        assert_eq!(resource.bindings()[1].method(), Method::POST);
        assert_eq!(resource.bindings()[1].consumed(), ["application/json"]);
        assert_eq!(resource.bindings()[1].name(), Some("create"));
        assert_eq!(resource.bindings()[1].handler().shape(), ReturnShape::Void);
        assert_eq!(resource.children().len(), 2);
        assert!(resource.children()[1].get_locator().is_some());
    }

    #[test]
    fn test_locator_panic_is_handler_error() {
        let locator = Locator::new(|_: &RequestContext| -> Result<SubResource, HandlerError> {
            panic!("lost")
        });
        let ctx = RequestContext::new(Method::GET, "/");
        let Err(InvokeError::Handler(error)) = locator.locate(&ctx) else {
            panic!("expected a handler error");
        };
        assert!(error.is_panic());
    }
}
