//! WebSocket Bridge
//!
//! This module contains the core logic for bridging browser calls onto
//! Ultravox over WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON message surface and upgrade parameters.
//! - `session`: Manages the connection lifecycle, from upgrade to teardown.
//! - `relay`: The per-direction pump loops and keep-alive timer.
//! - `ultravox`: Call creation and the upstream WebSocket connection.

pub mod protocol;
mod relay;
pub mod session;
pub mod ultravox;

pub use session::ws_handler;
