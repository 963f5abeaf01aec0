//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: configuration, the HTTP client used for Ultravox
//! call creation, and the session registry.

use crate::{config::Config, registry::SessionRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub registry: Arc<SessionRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            registry: Arc::new(SessionRegistry::default()),
            started_at: Utc::now(),
        }
    }
}
