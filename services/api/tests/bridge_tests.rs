// End-to-end tests for the bridge: a real client WebSocket against the
// service, with the Ultravox call-creation API and the agent WebSocket
// both mocked on local listeners.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::Level;
use voxbridge_api::{config::Config, router::create_router, state::AppState};
use voxbridge_core::mulaw;

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the Ultravox call-creation endpoint: reads one HTTP request per
/// connection and answers with the given status and JSON body.
async fn spawn_call_api(status: &'static str, body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                let (header_end, content_length) = loop {
                    let Ok(n) = stream.read(&mut chunk).await else {
                        return;
                    };
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        let headers = String::from_utf8_lossy(&request[..pos]);
                        let content_length = headers
                            .lines()
                            .find_map(|line| {
                                line.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        break (pos + 4, content_length);
                    }
                };
                while request.len() < header_end + content_length {
                    let Ok(n) = stream.read(&mut chunk).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.flush().await;
            });
        }
    });
    addr
}

/// A mock agent WebSocket: everything the bridge sends surfaces on
/// `from_bridge`, and anything pushed into `to_bridge` is sent back.
struct MockAgent {
    addr: SocketAddr,
    from_bridge: mpsc::UnboundedReceiver<Message>,
    to_bridge: mpsc::UnboundedSender<Message>,
}

async fn spawn_agent() -> MockAgent {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut tx, mut rx) = socket.split();
        loop {
            tokio::select! {
                incoming = rx.next() => match incoming {
                    Some(Ok(message)) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    _ => break,
                },
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });
    MockAgent {
        addr,
        from_bridge: inbound_rx,
        to_bridge: outbound_tx,
    }
}

fn test_config(api_addr: SocketAddr) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        api_key: "test-key".to_string(),
        api_base: format!("http://{api_addr}"),
        log_level: Level::INFO,
    }
}

async fn serve_bridge(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct Bridge {
    client: ClientSocket,
    agent: MockAgent,
    state: Arc<AppState>,
}

/// Brings up the full chain and waits for the `connected` notification.
async fn start_bridge(context: &str) -> Bridge {
    start_bridge_with_query(&format!("context={context}")).await
}

async fn start_bridge_with_query(query: &str) -> Bridge {
    let agent = spawn_agent().await;
    let api_addr = spawn_call_api(
        "200 OK",
        format!(r#"{{"callId":"c-1","joinUrl":"ws://{}"}}"#, agent.addr),
    )
    .await;
    let state = Arc::new(AppState::new(test_config(api_addr)));
    let addr = serve_bridge(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?{query}"))
        .await
        .unwrap();
    let first = next_within(&mut client, Duration::from_secs(5)).await;
    assert_eq!(json_type(&first), "connected", "first message: {first:?}");

    Bridge {
        client,
        agent,
        state,
    }
}

async fn next_within(socket: &mut ClientSocket, timeout: Duration) -> Message {
    tokio::time::timeout(timeout, socket.next())
        .await
        .expect("timed out waiting for message")
        .expect("socket closed unexpectedly")
        .expect("socket error")
}

async fn agent_next(agent: &mut MockAgent) -> Message {
    tokio::time::timeout(Duration::from_secs(5), agent.from_bridge.recv())
        .await
        .expect("timed out waiting for agent message")
        .expect("agent channel closed")
}

fn json_type(message: &Message) -> String {
    match message {
        Message::Text(text) => serde_json::from_str::<serde_json::Value>(text.as_str())
            .ok()
            .and_then(|v| v["type"].as_str().map(str::to_string))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn tone(samples: usize, rate: f64, frequency: f64) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / rate;
            (8000.0 * (2.0 * std::f64::consts::PI * frequency * t).sin()).round() as i16
        })
        .collect()
}

/// Peak of the magnitude spectrum over a 5 Hz grid.
fn dominant_frequency(samples: &[i16], rate: f64) -> f64 {
    let mut best_frequency = 0.0;
    let mut best_power = 0.0;
    let mut frequency = 100.0;
    while frequency <= 1500.0 {
        let (mut re, mut im) = (0.0f64, 0.0f64);
        for (i, &sample) in samples.iter().enumerate() {
            let phase = 2.0 * std::f64::consts::PI * frequency * i as f64 / rate;
            re += sample as f64 * phase.cos();
            im -= sample as f64 * phase.sin();
        }
        let power = re * re + im * im;
        if power > best_power {
            best_power = power;
            best_frequency = frequency;
        }
        frequency += 5.0;
    }
    best_frequency
}

async fn wait_for_empty_registry(state: &Arc<AppState>) {
    for _ in 0..100 {
        if state.registry.active().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("registry still has active sessions");
}

#[tokio::test]
async fn happy_path_widens_client_audio() {
    let mut bridge = start_bridge("hello").await;

    // 40 ms of PCMU: 320 bytes in, 3840 bytes of PCM16 @ 48 kHz out.
    let pcmu = mulaw::encode(&tone(320, 8000.0, 440.0));
    bridge
        .client
        .send(Message::Binary(pcmu.into()))
        .await
        .unwrap();

    let mut received = 0usize;
    while received < 3840 {
        if let Message::Binary(data) = agent_next(&mut bridge.agent).await {
            assert_eq!(data.len() % 2, 0, "PCM16 frames are whole samples");
            received += data.len();
        }
    }
    assert_eq!(received, 3840);
}

#[tokio::test]
async fn malformed_sample_rate_is_accepted_and_ignored() {
    // A non-numeric sampleRate must not reject the upgrade; the session
    // comes up and bridges audio at the fixed 8 kHz wire rate.
    let mut bridge = start_bridge_with_query("context=hello&sampleRate=abc").await;

    let pcmu = mulaw::encode(&tone(320, 8000.0, 440.0));
    bridge
        .client
        .send(Message::Binary(pcmu.into()))
        .await
        .unwrap();

    let mut received = 0usize;
    while received < 3840 {
        if let Message::Binary(data) = agent_next(&mut bridge.agent).await {
            received += data.len();
        }
    }
    assert_eq!(received, 3840);
}

#[tokio::test]
async fn reverse_path_preserves_tone_frequency() {
    let mut bridge = start_bridge("hello").await;

    let samples = tone(1920, 48000.0, 440.0);
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    bridge
        .agent
        .to_bridge
        .send(Message::Binary(bytes.into()))
        .unwrap();

    let message = next_within(&mut bridge.client, Duration::from_secs(5)).await;
    let Message::Binary(pcmu) = message else {
        panic!("expected binary frame, got {message:?}");
    };
    assert_eq!(pcmu.len(), 320);

    let recovered = mulaw::decode(&pcmu);
    let frequency = dominant_frequency(&recovered, 8000.0);
    assert!(
        (frequency - 440.0).abs() <= 10.0,
        "dominant frequency {frequency} Hz"
    );
}

#[tokio::test]
async fn digital_silence_is_suppressed() {
    let mut bridge = start_bridge("hello").await;

    bridge
        .agent
        .to_bridge
        .send(Message::Binary(vec![0u8; 3840].into()))
        .unwrap();
    bridge
        .agent
        .to_bridge
        .send(Message::text(
            r#"{"type":"transcript","transcript":"marker"}"#,
        ))
        .unwrap();

    // Both frames flow through the same upstream reader in order, so the
    // marker arriving first proves the silent frame was dropped.
    let message = next_within(&mut bridge.client, Duration::from_secs(5)).await;
    match message {
        Message::Text(text) => assert!(text.as_str().contains("marker")),
        other => panic!("expected the marker text, got {other:?}"),
    }
}

#[tokio::test]
async fn call_creation_failure_reports_error_and_closes() {
    let api_addr = spawn_call_api(
        "504 Gateway Timeout",
        r#"{"error":"upstream timeout"}"#.to_string(),
    )
    .await;
    let state = Arc::new(AppState::new(test_config(api_addr)));
    let addr = serve_bridge(state.clone()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws?context=hello"))
        .await
        .unwrap();

    let message = next_within(&mut client, Duration::from_secs(5)).await;
    let value: serde_json::Value = match &message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected error JSON, got {other:?}"),
    };
    assert_eq!(value["type"], "error");
    assert_eq!(value["error"], "Failed to create Ultravox call");
    assert!(value["details"].as_str().unwrap().contains("504"));

    // The socket closes and the registry drains.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("socket did not close")
        {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        }
    }
    wait_for_empty_registry(&state).await;
}

#[tokio::test]
async fn client_close_propagates_upstream_within_a_second() {
    let mut bridge = start_bridge("hello").await;

    bridge.client.close(None).await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match bridge.agent.from_bridge.recv().await {
                Some(Message::Close(_)) | None => break,
                Some(_) => continue,
            }
        }
    })
    .await;
    assert!(observed.is_ok(), "upstream did not observe the close in time");
    wait_for_empty_registry(&bridge.state).await;
}

#[tokio::test]
async fn playback_clear_buffer_is_relayed_verbatim() {
    let mut bridge = start_bridge("hello").await;

    let payload = r#"{"type":"playback_clear_buffer"}"#;
    bridge.agent.to_bridge.send(Message::text(payload)).unwrap();

    let message = next_within(&mut bridge.client, Duration::from_secs(5)).await;
    match message {
        Message::Text(text) => assert_eq!(text.as_str(), payload),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn client_text_reaches_upstream_untouched() {
    let mut bridge = start_bridge("hello").await;

    let payload = r#"{"type":"mute","muted":true}"#;
    bridge.client.send(Message::text(payload)).await.unwrap();

    loop {
        match agent_next(&mut bridge.agent).await {
            Message::Text(text) => {
                assert_eq!(text.as_str(), payload);
                break;
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn binary_frames_keep_their_order() {
    let mut bridge = start_bridge("hello").await;

    // Distinct input lengths produce distinct output lengths, which makes
    // reordering visible.
    let lengths = [8usize, 16, 24, 32, 40];
    for len in lengths {
        bridge
            .client
            .send(Message::Binary(vec![0xffu8; len].into()))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < lengths.len() {
        if let Message::Binary(data) = agent_next(&mut bridge.agent).await {
            seen.push(data.len());
        }
    }
    let expected: Vec<usize> = lengths.iter().map(|len| len * 6 * 2).collect();
    assert_eq!(seen, expected);
}
