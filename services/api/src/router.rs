//! Axum Router Configuration
//!
//! The bridge's HTTP surface is deliberately small: the WebSocket
//! endpoint and a health probe that exposes the aggregate statistics.

use crate::{registry::RegistryStats, state::AppState, ws::ws_handler};

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: i64,
    #[serde(flatten)]
    stats: RegistryStats,
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(app_state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        stats: state.registry.snapshot().await,
    })
}
