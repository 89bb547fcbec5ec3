//! Resource runtime server.
//!
//! Serves the demo catalog through the resource runtime.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request id, trace, body limit)
//!                         │
//!                         ▼
//!                     Application::handle
//!                         │
//!          ┌──────────────┼───────────────────────┐
//!          ▼              ▼                       ▼
//!     routing::Router  routing::selector     dispatch::Dispatcher
//!     (templates,      (method, consumes,    (extract arguments,
//!      locators,        produces via media)   normalize results,
//!      locator cache)                          deferred values)
//!                         │
//!                         ▼
//!     Client Response ◀── ResponseDescriptor → axum Response
//!
//!     Cross-cutting: config (TOML), observability (tracing, metrics),
//!                    lifecycle (signals, graceful shutdown)
//! ```

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resource_runtime::config::{load_config, RuntimeConfig};
use resource_runtime::lifecycle::{spawn_signal_listener, Shutdown};
use resource_runtime::observability::{logging, metrics};
use resource_runtime::{Application, HttpServer};

#[derive(Parser)]
#[command(name = "resource-runtime")]
#[command(about = "Serve declarative resources over HTTP", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resource-runtime starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_bytes = config.listener.max_body_bytes,
        request_timeout_secs = config.timeouts.request_secs,
        model_caching = config.routing.model_caching,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
        tracing::info!(address = %addr, "Metrics exporter listening");
    }

    let catalog = Arc::new(demo::Catalog::new());
    let app = demo::install(Application::builder(&config), catalog).build()?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config, Arc::new(app));
    server.run(listener, shutdown).await?;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
