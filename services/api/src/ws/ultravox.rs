//! Handles the Ultravox upstream: call creation over HTTP and the
//! wide-band WebSocket the agent speaks on.
//!
//! Audio on the upstream socket is PCM16-LE at 48 kHz, mono, in both
//! directions; text frames are JSON events that the relay forwards to
//! the client verbatim.

use crate::{config::Config, error::BridgeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::info;

/// Model served on the Ultravox call.
const MODEL: &str = "fixie-ai/ultravox";

/// Voice used by the agent.
const VOICE: &str = "Riya-Rao-English-Indian";

/// Sample rate of the upstream leg, both directions.
const UPSTREAM_SAMPLE_RATE: u32 = voxbridge_core::pipeline::WIDEBAND_RATE;

/// Timeout for the call-creation POST.
pub const CALL_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the upstream WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    system_prompt: String,
    model: String,
    voice: String,
    medium: CallMedium,
    vad_settings: VadSettings,
    first_speaker: String,
    recording_enabled: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CallMedium {
    server_web_socket: ServerWebSocketMedium,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ServerWebSocketMedium {
    input_sample_rate: u32,
    output_sample_rate: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VadSettings {
    turn_endpoint_delay: String,
    minimum_turn_duration: String,
    minimum_interruption_duration: String,
    frame_activation_threshold: f64,
}

impl CreateCallRequest {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            model: MODEL.to_string(),
            voice: VOICE.to_string(),
            medium: CallMedium {
                server_web_socket: ServerWebSocketMedium {
                    input_sample_rate: UPSTREAM_SAMPLE_RATE,
                    output_sample_rate: UPSTREAM_SAMPLE_RATE,
                },
            },
            vad_settings: VadSettings {
                turn_endpoint_delay: "0.5s".to_string(),
                minimum_turn_duration: "0.1s".to_string(),
                minimum_interruption_duration: "0.2s".to_string(),
                frame_activation_threshold: 0.15,
            },
            first_speaker: "FIRST_SPEAKER_AGENT".to_string(),
            recording_enabled: false,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateCallResponse {
    join_url: Option<String>,
}

/// Creates an Ultravox call and returns its join URL.
pub async fn create_call(
    http: &reqwest::Client,
    config: &Config,
    system_prompt: &str,
) -> Result<String, BridgeError> {
    let url = format!("{}/api/calls", config.api_base);
    let response = http
        .post(&url)
        .header("X-API-Key", &config.api_key)
        .json(&CreateCallRequest::new(system_prompt))
        .timeout(CALL_CREATE_TIMEOUT)
        .send()
        .await
        .map_err(|e| BridgeError::UpstreamSetup(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BridgeError::UpstreamSetup(format!(
            "call creation returned {status}"
        )));
    }

    let body: CreateCallResponse = response
        .json()
        .await
        .map_err(|e| BridgeError::UpstreamSetup(e.to_string()))?;
    body.join_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| BridgeError::UpstreamSetup("response carried no joinUrl".to_string()))
}

/// Opens the upstream WebSocket for an existing call.
pub async fn connect(join_url: &str) -> Result<UpstreamSocket, BridgeError> {
    let (socket, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(join_url))
        .await
        .map_err(|_| BridgeError::UpstreamConnect)?
        .map_err(|_| BridgeError::UpstreamConnect)?;
    info!("Connected to Ultravox call");
    Ok(socket)
}
