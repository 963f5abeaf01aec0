//! Voxbridge API Library Crate
//!
//! This library contains all the logic for the voice-bridge web service:
//! configuration, shared state, the session registry and statistics, the
//! HTTP router, and the WebSocket relay itself. The `bin/bridge.rs`
//! binary is a thin wrapper around this library.

pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
