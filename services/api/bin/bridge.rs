//! Main Entrypoint for the Voxbridge Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Constructing the shared state and the Axum router.
//! 4. Starting the web server and handling graceful shutdown, closing
//!    every active session and logging final statistics on the way out.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use voxbridge_api::{
    config::Config,
    registry::{self, SessionRegistry},
    router::create_router,
    state::AppState,
};

/// Waits for SIGINT or SIGTERM, then asks every active session to close
/// so the server can drain its connections.
async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }

    info!("Shutting down gracefully; closing active sessions...");
    registry.close_all("server shutting down").await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing bridge state...");

    // --- 3. Initialize Shared State ---
    let app_state = Arc::new(AppState::new(config.clone()));
    let stats_reporter = registry::spawn_stats_reporter(app_state.registry.clone());

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(app_state.clone()).layer(cors);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        api_base = %config.api_base,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .context("Failed to bind listener")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(app_state.registry.clone()))
    .await?;

    // --- 6. Final Statistics ---
    stats_reporter.abort();
    let stats = app_state.registry.snapshot().await;
    registry::log_stats(&stats, "Final bridge statistics");
    info!("Server has shut down.");
    Ok(())
}
