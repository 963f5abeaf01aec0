//! The per-session duplex pump.
//!
//! One task per direction, plus a keep-alive timer. Each task owns its
//! direction's smoother tail, so the tails never need locking, and each
//! sends through the opposite endpoint's shared sink. All three race the
//! session close signal; whoever observes a dead peer first wins the
//! Closing edge and the others drain out.

use super::{protocol::UpstreamEvent, session::SessionHandle, ultravox::UpstreamSocket};
use crate::error::BridgeError;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use voxbridge_core::pipeline;

/// Interval between keep-alive pings to the client.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Client → upstream: PCMU frames are widened to PCM16 @ 48 kHz, text is
/// forwarded untouched.
pub(crate) async fn pump_client(
    session: Arc<SessionHandle>,
    mut client_rx: SplitStream<WebSocket>,
    upstream_tx: Arc<Mutex<SplitSink<UpstreamSocket, WsMessage>>>,
) {
    let mut close_rx = session.closed_signal();
    let mut tail: i16 = 0;
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            next = client_rx.next() => match next {
                Some(Ok(Message::Binary(frame))) => {
                    session.record_client_bytes(frame.len());
                    let (wide, next_tail) = pipeline::pcmu_to_wideband(&frame, tail);
                    tail = next_tail;
                    session.record_conversion();

                    let mut sink = upstream_tx.lock().await;
                    if sink.send(WsMessage::Binary(wide.into())).await.is_err() {
                        session.close("upstream send failed");
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    let mut sink = upstream_tx.lock().await;
                    if sink.send(WsMessage::text(text.to_string())).await.is_err() {
                        session.close("upstream send failed");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    session.close("client closed");
                    break;
                }
                // Axum answers pings itself; pongs need no action.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Err(source)) => {
                    let err = BridgeError::PeerError(source.to_string());
                    warn!(error = %err, "Client transport error");
                    session.record_transport_error();
                    session.close("client transport error");
                    break;
                }
            }
        }
    }
}

/// Upstream → client: PCM16 @ 48 kHz is narrowed to PCMU, text is
/// classified for logging and forwarded verbatim.
pub(crate) async fn pump_upstream(
    session: Arc<SessionHandle>,
    mut upstream_rx: SplitStream<UpstreamSocket>,
    client_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
) {
    let mut close_rx = session.closed_signal();
    let mut tail: i16 = 0;
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            next = upstream_rx.next() => match next {
                Some(Ok(WsMessage::Binary(frame))) => {
                    match pipeline::wideband_to_pcmu(&frame, tail) {
                        Ok((pcmu, next_tail)) => {
                            tail = next_tail;
                            session.record_conversion();
                            if pipeline::is_uniform(&pcmu) {
                                debug!(len = pcmu.len(), "Suppressed uniform PCMU frame");
                                continue;
                            }
                            session.record_sent_bytes(pcmu.len());

                            let mut sink = client_tx.lock().await;
                            if sink.send(Message::Binary(pcmu.into())).await.is_err() {
                                session.close("client send failed");
                                break;
                            }
                        }
                        Err(err) => {
                            // Malformed frames are dropped; the stream lives on.
                            let err = BridgeError::Transform(err);
                            warn!(error = %err, "Dropping malformed upstream frame");
                        }
                    }
                }
                Some(Ok(WsMessage::Text(text))) => {
                    match UpstreamEvent::classify(&text) {
                        UpstreamEvent::Transcript { transcript } => {
                            debug!(transcript, "Upstream transcript");
                        }
                        UpstreamEvent::Response { text } => {
                            debug!(text, "Upstream response");
                        }
                        UpstreamEvent::Error { ref error, .. } => {
                            warn!(error, "Upstream reported an error");
                        }
                        UpstreamEvent::PlaybackClearBuffer => {
                            debug!("Upstream requested playback flush");
                        }
                        UpstreamEvent::Connected | UpstreamEvent::Passthrough => {}
                    }

                    let mut sink = client_tx.lock().await;
                    if sink.send(Message::Text(text.to_string().into())).await.is_err() {
                        session.close("client send failed");
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    session.close("upstream closed");
                    break;
                }
                Some(Ok(WsMessage::Ping(_)))
                | Some(Ok(WsMessage::Pong(_)))
                | Some(Ok(WsMessage::Frame(_))) => {}
                Some(Err(source)) => {
                    let err = BridgeError::PeerError(source.to_string());
                    warn!(error = %err, "Upstream transport error");
                    session.record_transport_error();
                    session.close("upstream transport error");
                    break;
                }
            }
        }
    }
}

/// Pings the client every 30 s; a failed write means the client is gone.
pub(crate) async fn keepalive(
    session: Arc<SessionHandle>,
    client_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
) {
    let mut close_rx = session.closed_signal();
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            _ = ticker.tick() => {
                let mut sink = client_tx.lock().await;
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    session.close("keep-alive ping failed");
                    break;
                }
            }
        }
    }
}
