//! Bridge error kinds and their client-facing disposition.
//!
//! Connection-level failures surface to the client exactly once as an
//! `error` JSON message before the socket closes; transform-level
//! failures stay local to the relay, which drops the offending frame.

use crate::ws::protocol::BridgeMessage;
use voxbridge_core::pipeline::TransformError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The upgrade request was malformed (bad query parameters).
    #[error("Malformed request: {0}")]
    BadRequest(String),
    /// Call creation against the Ultravox HTTP API failed.
    #[error("Ultravox call creation failed: {0}")]
    UpstreamSetup(String),
    /// The upstream WebSocket handshake timed out or errored.
    #[error("Ultravox connection timeout")]
    UpstreamConnect,
    /// A frame could not be interpreted in the declared audio format.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// An endpoint closed its side of the bridge.
    #[error("Peer closed the connection")]
    PeerClosed,
    /// An endpoint failed at the transport level.
    #[error("Peer transport error: {0}")]
    PeerError(String),
}

impl BridgeError {
    /// The JSON message shown to the client before its socket closes.
    pub fn to_client_message(&self) -> BridgeMessage {
        match self {
            BridgeError::UpstreamSetup(details) => BridgeMessage::Error {
                error: "Failed to create Ultravox call".to_string(),
                details: Some(details.clone()),
            },
            BridgeError::UpstreamConnect => BridgeMessage::Error {
                error: "Ultravox connection timeout".to_string(),
                details: None,
            },
            other => BridgeMessage::Error {
                error: other.to_string(),
                details: None,
            },
        }
    }
}
