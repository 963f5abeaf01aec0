//! Defines the JSON message surface between the bridge, the browser
//! client, and the Ultravox call.
//!
//! Upstream text frames are always relayed verbatim; `UpstreamEvent` only
//! classifies them so the relay can log transcripts and spot errors
//! without re-serializing anything.

use serde::{Deserialize, Serialize};

/// Fallback system-prompt seed when the client supplies no `context`.
pub const DEFAULT_CONTEXT: &str =
    "You are a helpful assistant. Please respond naturally and engage in conversation.";

/// Query parameters accepted on the `/ws` upgrade URL.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    /// Opaque per-call system-prompt seed.
    pub context: Option<String>,
    /// Advisory only, kept as the raw text so that any value, numeric or
    /// not, is accepted and ignored. The wire rate is fixed at 8 kHz.
    pub sample_rate: Option<String>,
}

/// Messages the bridge itself originates toward the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Emitted exactly once, when the upstream call is ready.
    Connected,
    /// Reports a fatal error before the client socket closes.
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// Classification of a text frame received from upstream.
///
/// Anything that is not JSON, or whose `type` is not one of the known
/// tags, lands in `Passthrough`. Either way the original text is what
/// gets forwarded.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamEvent {
    Connected,
    Transcript {
        transcript: String,
    },
    Response {
        text: String,
    },
    PlaybackClearBuffer,
    Error {
        error: String,
        #[serde(default)]
        details: Option<String>,
    },
    #[serde(skip)]
    Passthrough,
}

impl UpstreamEvent {
    pub fn classify(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(UpstreamEvent::Passthrough)
    }
}
