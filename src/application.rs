//! Request processing pipeline.
//!
//! # Responsibilities
//! - Own the router, the dispatcher and the error mappers
//! - Route → select → dispatch → complete deferred results → finalize
//! - Turn every failure into a well-formed response
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → Router::resolve (404 / 405 / 415 / 406 / 400)
//!     → Route::Options → 200 + Allow
//!     → Dispatcher::dispatch → DispatchOutcome
//!     → Deferred? await with the request timeout (503 on expiry)
//!     → Content-Type from negotiation, HEAD drops the entity
//!     → ResponseDescriptor
//! ```
//!
//! # Design Decisions
//! - `handle` never fails; errors are responses
//! - Errors with an explicit status skip the mappers
//! - Mappers are tried in registration order; the first match wins

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::config::schema::RuntimeConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher, HandlerError, InvokeError, ResponseDescriptor};
use crate::http::request::RequestContext;
use crate::media::{CombinedMediaType, MediaType};
use crate::observability::metrics;
use crate::routing::{
    CacheStats, ModelError, Resource, ResourceType, Route, Router, RouterOptions, RoutingError,
};

/// Why a request could not be served normally.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl ProcessingError {
    /// Status used when no mapper handles the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProcessingError::Routing(e) => e.status(),
            ProcessingError::Invoke(e) => e.default_status(),
        }
    }

    /// The handler error inside, if a handler or locator raised one.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            ProcessingError::Invoke(InvokeError::Handler(e))
            | ProcessingError::Routing(RoutingError::Locator(InvokeError::Handler(e))) => Some(e),
            _ => None,
        }
    }
}

type MapFn = dyn Fn(&(dyn StdError + Send + Sync + 'static)) -> Option<ResponseDescriptor> + Send + Sync;

/// Registry turning handler errors into responses.
#[derive(Clone, Default)]
pub struct ErrorMappers {
    mappers: Vec<Arc<MapFn>>,
}

impl ErrorMappers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map errors of type `E` with `f`.
    pub fn register<E, F>(&mut self, f: F)
    where
        E: StdError + 'static,
        F: Fn(&E) -> ResponseDescriptor + Send + Sync + 'static,
    {
        self.mappers.push(Arc::new(move |error: &(dyn StdError + Send + Sync + 'static)| {
            error.downcast_ref::<E>().map(&f)
        }));
    }

    /// First mapping for `error`, if any mapper matches its type.
    pub fn map(&self, error: &HandlerError) -> Option<ResponseDescriptor> {
        self.mappers.iter().find_map(|m| m(error.source_error()))
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl fmt::Debug for ErrorMappers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMappers").field("len", &self.mappers.len()).finish()
    }
}

/// Builder for [`Application`].
#[derive(Debug)]
pub struct ApplicationBuilder {
    options: RouterOptions,
    request_timeout: Duration,
    resources: Vec<Resource>,
    mappers: ErrorMappers,
}

impl ApplicationBuilder {
    /// Register a root resource.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resources<I>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = Resource>,
    {
        self.resources.extend(resources);
        self
    }

    /// Serve resource type `T` at `path`.
    pub fn mount<T: ResourceType>(self, path: impl Into<String>) -> Self {
        self.resource(T::resource().with_path(path))
    }

    /// Map handler errors of type `E` to responses.
    pub fn error_mapper<E, F>(mut self, f: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> ResponseDescriptor + Send + Sync + 'static,
    {
        self.mappers.register(f);
        self
    }

    /// Time allowed for deferred results.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn router_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    /// Build and validate the route tree.
    pub fn build(self) -> Result<Application, ModelError> {
        let router = Router::new(&self.resources, self.options)?;
        tracing::info!(
            resources = self.resources.len(),
            error_mappers = self.mappers.len(),
            validate = self.options.build.validate,
            model_caching = self.options.cache.model_caching,
            "Application built"
        );
        Ok(Application {
            router,
            dispatcher: Dispatcher::new(),
            mappers: self.mappers,
            request_timeout: self.request_timeout,
        })
    }
}

/// A built application: resolves and serves requests.
#[derive(Debug)]
pub struct Application {
    router: Router,
    dispatcher: Dispatcher,
    mappers: ErrorMappers,
    request_timeout: Duration,
}

impl Application {
    pub fn builder(config: &RuntimeConfig) -> ApplicationBuilder {
        ApplicationBuilder {
            options: RouterOptions::from_config(&config.routing),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            resources: Vec::new(),
            mappers: ErrorMappers::new(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.router.cache_stats()
    }

    /// Serve one request. Every failure becomes an error response.
    pub async fn handle(&self, mut ctx: RequestContext) -> ResponseDescriptor {
        let start = Instant::now();
        let mut response = match self.process(&mut ctx).await {
            Ok(response) => response,
            Err(error) => self.error_response(&ctx, error),
        };
        if *ctx.method() == Method::HEAD {
            response.take_entity();
        }

        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );
        metrics::record_request(ctx.method().as_str(), response.status().as_u16(), start);
        response
    }

    /// Route and dispatch without completing deferred results.
    ///
    /// For collaborators that finish deferred outcomes themselves, e.g.
    /// with [`crate::dispatch::Deferred::on_complete`].
    pub fn dispatch_outcome(&self, ctx: &mut RequestContext) -> Result<DispatchOutcome, ProcessingError> {
        self.route_and_dispatch(ctx).map(|(outcome, _)| outcome)
    }

    fn route_and_dispatch(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<(DispatchOutcome, Option<CombinedMediaType>), ProcessingError> {
        let selection = match self.router.resolve(ctx)? {
            Route::Options { allowed } => {
                let response = ResponseDescriptor::ok().header(ALLOW, &allow_value(&allowed));
                return Ok((DispatchOutcome::Response(response), None));
            }
            Route::Handler(selection) => selection,
        };
        tracing::debug!(
            request_id = %ctx.request_id(),
            node = %selection.node.path(),
            binding = selection.binding.name().unwrap_or("<unnamed>"),
            media_type = %selection.media_type,
            head = selection.head,
            "Binding selected"
        );
        let outcome = self.dispatcher.dispatch(selection.binding.handler(), ctx)?;
        Ok((outcome, Some(selection.media_type)))
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ResponseDescriptor, ProcessingError> {
        let (outcome, negotiated) = self.route_and_dispatch(ctx)?;
        let outcome = match outcome {
            DispatchOutcome::Deferred(deferred) => {
                tracing::debug!(request_id = %ctx.request_id(), "Awaiting deferred result");
                deferred.complete_within(self.request_timeout).await?
            }
            other => other,
        };
        let mut response = outcome
            .into_response()
            .map_err(|_| InvokeError::Mechanism("deferred result did not complete".to_string()))?;
        if let Some(negotiated) = negotiated {
            apply_content_type(&mut response, &negotiated.media_type)?;
        }
        Ok(response)
    }

    fn error_response(&self, ctx: &RequestContext, error: ProcessingError) -> ResponseDescriptor {
        if let Some(handler_error) = error.handler_error() {
            if handler_error.status().is_none() {
                if let Some(mapped) = self.mappers.map(handler_error) {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        status = mapped.status().as_u16(),
                        "Handler error mapped"
                    );
                    return mapped;
                }
            }
        }

        let status = error.status();
        if status.is_server_error() {
            tracing::error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error = %error,
                "Request failed"
            );
        } else {
            tracing::debug!(
                request_id = %ctx.request_id(),
                status = status.as_u16(),
                error = %error,
                "Request rejected"
            );
        }

        let mut response = ResponseDescriptor::new(status).entity(error_body(&error, status));
        if let ProcessingError::Routing(RoutingError::MethodNotAllowed { allowed }) = &error {
            response = response.header(ALLOW, &allow_value(allowed));
        }
        response
    }
}

/// Message sent to the client. Internal details stay in the logs.
fn error_body(error: &ProcessingError, status: StatusCode) -> String {
    if let Some(handler_error) = error.handler_error().filter(|e| e.status().is_some()) {
        return handler_error.to_string();
    }
    if !status.is_server_error() {
        error.to_string()
    } else {
        status.canonical_reason().unwrap_or("Internal Server Error").to_string()
    }
}

fn allow_value(methods: &[Method]) -> String {
    methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ")
}

/// Set `Content-Type` from the negotiated type unless the handler set one.
fn apply_content_type(response: &mut ResponseDescriptor, negotiated: &MediaType) -> Result<(), RoutingError> {
    let Some(entity) = response.get_entity() else {
        return Ok(());
    };
    if response.headers().contains_key(CONTENT_TYPE) {
        return Ok(());
    }

    let media_type = if !negotiated.is_wildcard() {
        negotiated.clone()
    } else {
        let preferred = entity.default_media_type();
        if negotiated.is_compatible(&preferred) && !preferred.is_wildcard() {
            preferred
        } else if negotiated.is_wildcard_type() || negotiated.main_type() == "application" {
            MediaType::octet_stream()
        } else {
            return Err(RoutingError::NotAcceptable);
        }
    };

    if let Ok(value) = HeaderValue::from_str(&media_type.to_string()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{channel, Pending};
    use crate::routing::Binding;
    use std::io;

    fn app(resources: Vec<Resource>) -> Application {
        Application::builder(&RuntimeConfig::default())
            .resources(resources)
            .build()
            .unwrap()
    }

    fn content_type(response: &ResponseDescriptor) -> Option<&str> {
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_entity_gets_negotiated_type() {
        let app = app(vec![Resource::new("hello").bind(
            Binding::get(|_: &RequestContext| "hi").produces(["text/plain", "application/json"]),
        )]);
        let ctx = RequestContext::new(Method::GET, "/hello").with_header("accept", "application/json");
        let response = app.handle(ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), Some("application/json"));
    }

    #[tokio::test]
    async fn test_wildcard_uses_entity_default() {
        let app = app(vec![Resource::new("hello").get(|_: &RequestContext| "hi")]);
        let response = app.handle(RequestContext::new(Method::GET, "/hello")).await;
        assert_eq!(content_type(&response), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_void_is_no_content() {
        let app = app(vec![Resource::new("ping").post(|_: &RequestContext| ())]);
        let response = app.handle(RequestContext::new(Method::POST, "/ping")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.get_entity().is_none());
    }

    #[tokio::test]
    async fn test_head_drops_entity() {
        let app = app(vec![Resource::new("hello").get(|_: &RequestContext| "hi")]);
        let response = app.handle(RequestContext::new(Method::HEAD, "/hello")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.get_entity().is_none());
        assert_eq!(content_type(&response), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_options_and_405_carry_allow() {
        let app = app(vec![Resource::new("items").get(|_: &RequestContext| "x")]);
        let options = app.handle(RequestContext::new(Method::OPTIONS, "/items")).await;
        assert_eq!(options.status(), StatusCode::OK);
        assert_eq!(options.headers()[ALLOW], "GET, HEAD, OPTIONS");

        let rejected = app.handle(RequestContext::new(Method::DELETE, "/items")).await;
        assert_eq!(rejected.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rejected.headers()[ALLOW], "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn test_not_found() {
        let app = app(vec![]);
        let response = app.handle(RequestContext::new(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_mapper() {
        let app = Application::builder(&RuntimeConfig::default())
            .resource(Resource::new("io").get(|_: &RequestContext| -> Result<String, HandlerError> {
                Err(io::Error::new(io::ErrorKind::NotFound, "gone").into())
            }))
            .error_mapper(|e: &io::Error| ResponseDescriptor::new(StatusCode::GONE).entity(e.to_string()))
            .build()
            .unwrap();
        let response = app.handle(RequestContext::new(Method::GET, "/io")).await;
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_unmapped_error_is_500() {
        let app = app(vec![Resource::new("boom").get(|_: &RequestContext| -> Result<String, HandlerError> {
            Err(HandlerError::msg("secret detail"))
        })]);
        let response = app.handle(RequestContext::new(Method::GET, "/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.get_entity().and_then(|e| e.downcast_ref::<String>()).unwrap();
        assert!(!body.contains("secret"));
    }

    #[tokio::test]
    async fn test_explicit_status_skips_mappers() {
        let app = Application::builder(&RuntimeConfig::default())
            .resource(Resource::new("teapot").get(|_: &RequestContext| -> Result<String, HandlerError> {
                Err(HandlerError::with_status(StatusCode::IM_A_TEAPOT, "short and stout"))
            }))
            .error_mapper(|_: &io::Error| ResponseDescriptor::new(StatusCode::GONE))
            .build()
            .unwrap();
        let response = app.handle(RequestContext::new(Method::GET, "/teapot")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_deferred_result_completes() {
        let app = app(vec![Resource::new("later").get(|_: &RequestContext| {
            let (completer, pending) = channel::<String>();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                completer.complete("done".to_string());
            });
            pending
        })]);
        let response = app.handle(RequestContext::new(Method::GET, "/later")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.get_entity().and_then(|e| e.downcast_ref::<String>()).unwrap();
        assert_eq!(body, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_timeout_is_503() {
        let app = Application::builder(&RuntimeConfig::default())
            .resource(Resource::new("never").get(|_: &RequestContext| {
                Pending::<String>::new(std::future::pending())
            }))
            .request_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let response = app.handle(RequestContext::new(Method::GET, "/never")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_dispatch_outcome_exposes_deferred() {
        let app = app(vec![Resource::new("later").get(|_: &RequestContext| {
            Pending::<String>::new(std::future::pending())
        })]);
        let mut ctx = RequestContext::new(Method::GET, "/later");
        assert!(app.dispatch_outcome(&mut ctx).unwrap().is_deferred());
    }

    #[test]
    fn test_wildcard_concretization() {
        let mut response = ResponseDescriptor::ok().entity(vec![1u8, 2]);
        apply_content_type(&mut response, &"*/*".parse().unwrap()).unwrap();
        assert_eq!(content_type(&response), Some("application/octet-stream"));

        let mut response = ResponseDescriptor::ok().entity(vec![1u8]);
        assert!(apply_content_type(&mut response, &"image/*".parse().unwrap()).is_err());
    }

    #[test]
    fn test_model_errors_fail_build() {
        let result = Application::builder(&RuntimeConfig::default())
            .resource(Resource::new("x").get(|_: &RequestContext| "a").get(|_: &RequestContext| "b"))
            .build();
        assert!(matches!(result, Err(ModelError::Ambiguous { .. })));
    }
}
