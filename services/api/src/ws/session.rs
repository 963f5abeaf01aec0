//! Manages the client WebSocket lifecycle for a bridged call.
//!
//! Each accepted connection becomes one session: an Ultravox call is
//! created and joined, the duplex relay is spawned, and teardown is
//! driven top-down from the session handle. Closing is idempotent; the
//! first caller wins the Closing edge and everything else follows the
//! close signal.

use super::{
    protocol::{BridgeMessage, DEFAULT_CONTEXT, SessionQuery},
    relay, ultravox,
};
use crate::{error::BridgeError, state::AppState};
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

/// Close code sent to the client when the bridge fails before or during
/// the call.
const CLOSE_CODE_BRIDGE_ERROR: u16 = 4000;

/// Session lifecycle. Only forward transitions are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lifecycle {
    Accepted = 0,
    UpstreamConnecting = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Accepted,
            1 => Lifecycle::UpstreamConnecting,
            2 => Lifecycle::Active,
            3 => Lifecycle::Closing,
            _ => Lifecycle::Closed,
        }
    }
}

/// Final counter values for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub bytes_from_client: u64,
    pub bytes_to_client: u64,
    pub conversions: u64,
    pub transport_errors: u64,
}

/// Shared per-session record.
///
/// The relay tasks, the keep-alive timer, and the registry all hold an
/// `Arc` of this. The smoother tails deliberately live in the relay
/// loops, not here; each is owned by exactly one task.
pub struct SessionHandle {
    pub id: Uuid,
    pub context: String,
    pub started_at: DateTime<Utc>,
    lifecycle: AtomicU8,
    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,
    bytes_from_client: AtomicU64,
    bytes_to_client: AtomicU64,
    conversions: AtomicU64,
    transport_errors: AtomicU64,
}

impl SessionHandle {
    pub fn new(query: SessionQuery) -> Arc<Self> {
        let (close_tx, close_rx) = watch::channel(false);
        let context = query
            .context
            .filter(|context| !context.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
        Arc::new(Self {
            id: Uuid::new_v4(),
            context,
            started_at: Utc::now(),
            lifecycle: AtomicU8::new(Lifecycle::Accepted as u8),
            close_tx,
            close_rx,
            bytes_from_client: AtomicU64::new(0),
            bytes_to_client: AtomicU64::new(0),
            conversions: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// Moves the lifecycle forward. Returns the current state unchanged
    /// when `to` would not be a forward step.
    pub fn advance(&self, to: Lifecycle) -> Result<(), Lifecycle> {
        let mut current = self.lifecycle.load(Ordering::Acquire);
        loop {
            if to as u8 <= current {
                return Err(Lifecycle::from_u8(current));
            }
            match self.lifecycle.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Signals both relay loops to stop. Idempotent: only the caller that
    /// wins the Closing edge sends the signal, everyone else is a no-op.
    pub fn close(&self, reason: &str) -> bool {
        if self.advance(Lifecycle::Closing).is_ok() {
            debug!(session_id = %self.id, reason, "Closing session");
            let _ = self.close_tx.send(true);
            true
        } else {
            false
        }
    }

    pub fn is_closing(&self) -> bool {
        self.lifecycle() >= Lifecycle::Closing
    }

    /// A receiver that resolves once `close` has been called, including
    /// when it was called before the subscription.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.close_rx.clone()
    }

    pub fn record_client_bytes(&self, n: usize) {
        self.bytes_from_client.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_sent_bytes(&self, n: usize) {
        self.bytes_to_client.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_conversion(&self) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn totals(&self) -> SessionCounters {
        SessionCounters {
            bytes_from_client: self.bytes_from_client.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Axum handler to upgrade an HTTP connection to a bridged WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SessionQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// Main handler for an individual client connection.
#[instrument(name = "bridge_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: SessionQuery) {
    if let Some(rate) = query.sample_rate.as_deref() {
        if rate.parse::<u32>().ok() != Some(voxbridge_core::pipeline::NARROWBAND_RATE) {
            debug!(rate, "Ignoring requested sampleRate; wire rate is fixed at 8000");
        }
    }

    let session = SessionHandle::new(query);
    tracing::Span::current().record("session_id", session.id.to_string());
    state.registry.insert(session.clone()).await;
    info!(context_len = session.context.len(), "Client connected; establishing upstream call");

    let (client_tx, client_rx) = socket.split();
    let client_tx = Arc::new(Mutex::new(client_tx));

    if let Err(err) = run_bridge(&state, &session, &client_tx, client_rx).await {
        warn!(error = %err, "Bridge terminated with error");
        let mut sink = client_tx.lock().await;
        let _ = send_msg(&mut sink, err.to_client_message()).await;
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_CODE_BRIDGE_ERROR,
                reason: err.to_string().into(),
            })))
            .await;
    }

    session.close("bridge finished");
    if state.registry.remove(&session.id).await.is_some() {
        state.registry.absorb(&session);
    }
    let _ = session.advance(Lifecycle::Closed);
    let totals = session.totals();
    info!(
        bytes_from_client = totals.bytes_from_client,
        bytes_to_client = totals.bytes_to_client,
        conversions = totals.conversions,
        "Session closed"
    );
}

/// Establishes the upstream call and runs the relay until either side
/// ends. Errors returned here happened before any relaying started and
/// are reported to the client by the caller.
async fn run_bridge(
    state: &Arc<AppState>,
    session: &Arc<SessionHandle>,
    client_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    client_rx: futures_util::stream::SplitStream<WebSocket>,
) -> Result<(), BridgeError> {
    if session.advance(Lifecycle::UpstreamConnecting).is_err() {
        return Ok(());
    }

    let join_url = ultravox::create_call(&state.http, &state.config, &session.context).await?;
    let upstream = ultravox::connect(&join_url).await?;
    let (upstream_tx, upstream_rx) = upstream.split();
    let upstream_tx = Arc::new(Mutex::new(upstream_tx));

    // The Active edge can only be won once, so `connected` goes out
    // exactly once per session.
    if session.advance(Lifecycle::Active).is_err() {
        return Ok(());
    }
    {
        let mut sink = client_tx.lock().await;
        send_msg(&mut sink, BridgeMessage::Connected)
            .await
            .map_err(|_| BridgeError::PeerClosed)?;
    }
    info!("Upstream call established; relaying");

    let client_task = tokio::spawn(
        relay::pump_client(session.clone(), client_rx, upstream_tx.clone())
            .instrument(tracing::Span::current()),
    );
    let upstream_task = tokio::spawn(
        relay::pump_upstream(session.clone(), upstream_rx, client_tx.clone())
            .instrument(tracing::Span::current()),
    );
    let keepalive_task = tokio::spawn(
        relay::keepalive(session.clone(), client_tx.clone())
            .instrument(tracing::Span::current()),
    );

    let _ = tokio::join!(client_task, upstream_task, keepalive_task);

    // Best-effort close frames; either socket may already be gone.
    let _ = client_tx.lock().await.send(Message::Close(None)).await;
    let _ = upstream_tx
        .lock()
        .await
        .send(tokio_tungstenite::tungstenite::Message::Close(None))
        .await;
    Ok(())
}

/// A helper function to serialize and send a `BridgeMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: BridgeMessage,
) -> anyhow::Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
