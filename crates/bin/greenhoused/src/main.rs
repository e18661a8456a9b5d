//! # greenhoused: greenhouse controller daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (CLI arg, env vars, config file)
//! - Build the device catalogue and select the signal backend
//! - Construct the state store and drive every output OFF
//! - Build the axum router, injecting the store and event bus
//! - Bind to a TCP port and serve
//! - Handle graceful shutdown (SIGTERM/SIGINT), releasing every output
//!   exactly once
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer, no domain logic belongs here.

mod backend;
mod config;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing_subscriber::EnvFilter;

use greenhouse_adapter_http_axum::router;
use greenhouse_adapter_http_axum::state::{AppState, StreamCloser};
use greenhouse_app::event_bus::InProcessEventBus;
use greenhouse_app::services::state_store::StateStore;

use config::Config;

/// Longest wait for open connections once shutdown has begun. Outputs are
/// released afterwards either way.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let config =
        Config::load(&config_path).with_context(|| format!("failed to load {config_path}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let registry = Arc::new(config.registry().context("invalid device catalogue")?);
    let backend = backend::select(&config.gpio).context("no usable signal backend")?;

    let event_bus = Arc::new(InProcessEventBus::new(256));
    let store = Arc::new(
        StateStore::new(registry, backend, Arc::clone(&event_bus))
            .with_settle_time(config.gpio.settle_time()),
    );
    tracing::info!(
        backend = store.backend_name(),
        devices = store.registry().len(),
        "greenhoused starting"
    );

    // A faulted store still serves: status and control answer 503.
    if let Err(err) = store.initialize().await {
        tracing::error!(error = %err, "failed to initialize outputs, control requests will be refused");
    }

    let state = AppState::new(Arc::clone(&store), event_bus);
    let streams = state.stream_closer();
    let served = serve(&config.bind_addr(), router::build(state), streams).await;

    match store.shutdown().await {
        Ok(true) => tracing::info!("outputs released"),
        Ok(false) => {}
        Err(err) => tracing::error!(error = %err, "failed to release every output"),
    }
    tracing::info!("greenhoused shutdown complete");

    served
}

async fn serve(bind_addr: &str, app: Router, streams: StreamCloser) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("greenhoused listening on http://{bind_addr}");

    let (closing_tx, mut closing_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            streams.close();
            closing_tx.send_replace(true);
        })
        .into_future();
    let grace_expired = async move {
        if closing_rx.wait_for(|closing| *closing).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        served = server => served.context("HTTP server failed"),
        () = grace_expired => {
            tracing::warn!(grace = ?SHUTDOWN_GRACE, "connections still open after shutdown grace period");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
