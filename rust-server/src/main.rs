//! MsgVault server - webhook ingestion, query, and stats service.
//!
//! This binary:
//! - Receives signed webhook messages and stores them idempotently
//! - Serves filtered, paginated listings and summary statistics
//! - Exposes health probes and a plain-text metrics rendering

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use msgvault::web::{handlers, track_requests, AppState};
use msgvault::{Config, Metrics, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration; a missing secret is fatal, not a per-request error.
    let config = Config::from_env();
    ensure!(
        config.secret_configured(),
        "WEBHOOK_SECRET must be set before serving traffic"
    );
    info!(
        port = config.port,
        database_url = %config.database_url,
        "config_loaded"
    );
    let port = config.port;

    // Open the store and make sure the schema exists.
    let store = Store::connect(&config.database_url)
        .await
        .context("Failed to open database")?;
    store
        .init_schema()
        .await
        .context("Failed to initialize schema")?;
    info!("store_ready");

    // Create application state
    let metrics = Arc::new(Metrics::new());
    let state = AppState::new(config, store, metrics);

    // Build the router
    let app = Router::new()
        .route("/webhook", post(handlers::webhook))
        .route("/messages", get(handlers::messages))
        .route("/stats", get(handlers::stats))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready))
        .route("/metrics", get(handlers::render_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
