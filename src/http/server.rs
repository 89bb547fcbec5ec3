//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router that feeds every request to the `Application`
//! - Wire up middleware (tracing, request ID)
//! - Buffer request entities up to the configured limit
//! - Serve until shutdown, then drain within a deadline

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::application::Application;
use crate::config::RuntimeConfig;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::lifecycle::Shutdown;

/// State injected into the fallback handler.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Application>,
    pub max_body_bytes: usize,
}

/// HTTP server for the runtime.
pub struct HttpServer {
    router: Router,
    config: RuntimeConfig,
}

impl HttpServer {
    /// Create a new HTTP server serving `app`.
    pub fn new(config: RuntimeConfig, app: Arc<Application>) -> Self {
        let state = AppState {
            app,
            max_body_bytes: config.listener.max_body_bytes,
        };
        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(handle_request)
            .with_state(state)
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The router, for serving through another transport or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let drain = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let deadline = {
            let stopped = shutdown.wait();
            async move {
                stopped.await;
                tokio::time::sleep(drain).await;
            }
        };

        let server = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .into_future();

        tokio::select! {
            result = server => result?,
            _ = deadline => {
                tracing::warn!(drain_secs = drain.as_secs(), "Shutdown deadline reached, dropping connections");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

/// Buffer the entity, then hand the request to the application.
async fn handle_request(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                path = %parts.uri.path(),
                limit = state.max_body_bytes,
                error = %e,
                "Failed to read request body"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let ctx = RequestContext::from_parts(parts, body);
    state.app.handle(ctx).await.into_response()
}
