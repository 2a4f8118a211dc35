//! Integration tests: session lifecycle, frame round-trips, flow
//! control and reconnection against a real WebSocket server on
//! localhost.

use std::sync::Arc;
use std::time::Duration;

use async_tungstenite::tokio::accept_async;
use async_tungstenite::tungstenite::Message;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use posecast_core::{
    BackoffPolicy, ConnectionState, DropReason, FlowConfig, FrameCodec, FrameMessage,
    FrameOutcome, Overlay, PipelineConfig, PlanarImage, Plane, Rotation, SessionConfig,
    TracingSink, TransportSession,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

// ── Helpers ──────────────────────────────────────────────────────

const RESPONSE: &str = r#"{"image_width":4,"image_height":4,"keypoints":[[1,1],[3,3]],"topology":[[0,1],[1,5]],"label":"test"}"#;

#[derive(Debug, Clone, Copy)]
enum Reply {
    /// Answer every frame with `RESPONSE`.
    Keypoints,
    /// Never answer.
    Silent,
    /// Close the link after the first frame.
    CloseAfterFrame,
    /// Answer every frame with `RESPONSE` after a pause.
    Delayed(Duration),
    /// Close the link as soon as the handshake completes.
    CloseOnAccept,
}

#[derive(Debug)]
enum ServerEvent {
    Accepted,
    Frame(FrameMessage),
}

/// Serve on an OS-assigned port; returns the URL and an event stream.
async fn spawn_server(reply: Reply) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (url, serve(listener, reply))
}

fn serve(listener: TcpListener, reply: Reply) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                let _ = tx.send(ServerEvent::Accepted);
                if let Reply::CloseOnAccept = reply {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Binary(data) = msg else {
                        continue;
                    };
                    let mut buf = BytesMut::from(&data[..]);
                    let frame = FrameCodec.decode(&mut buf).unwrap().unwrap();
                    let _ = tx.send(ServerEvent::Frame(frame));
                    match reply {
                        Reply::Keypoints => {
                            if ws.send(Message::text(RESPONSE)).await.is_err() {
                                break;
                            }
                        }
                        Reply::Silent => {}
                        Reply::CloseAfterFrame => {
                            let _ = ws.close(None).await;
                            break;
                        }
                        Reply::Delayed(pause) => {
                            tokio::time::sleep(pause).await;
                            if ws.send(Message::text(RESPONSE)).await.is_err() {
                                break;
                            }
                        }
                        Reply::CloseOnAccept => unreachable!(),
                    }
                }
            });
        }
    });

    rx
}

fn config(url: &str) -> SessionConfig {
    SessionConfig {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        flow: FlowConfig {
            min_frame_interval: Duration::from_millis(10),
            response_timeout: Duration::from_millis(200),
        },
        backoff: BackoffPolicy {
            initial: Duration::from_millis(20),
            multiplier: 2,
            max: Duration::from_millis(80),
        },
        pipeline: PipelineConfig {
            target_width: 4,
            target_height: 4,
        },
        ..Default::default()
    }
}

fn session(url: &str) -> (TransportSession, mpsc::UnboundedReceiver<Overlay>) {
    session_with(config(url))
}

fn session_with(config: SessionConfig) -> (TransportSession, mpsc::UnboundedReceiver<Overlay>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |overlay: &Overlay| {
        let _ = tx.send(overlay.clone());
    };
    let s = TransportSession::new(config, Arc::new(sink), Box::new(TracingSink)).unwrap();
    (s, rx)
}

struct TestImage {
    luma: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl TestImage {
    fn new() -> Self {
        Self {
            luma: (0..64).collect(),
            u: vec![0x80; 16],
            v: vec![0x90; 16],
        }
    }

    fn image(&self) -> PlanarImage<'_> {
        PlanarImage {
            width: 8,
            height: 8,
            rotation: Rotation::Deg0,
            planes: [
                Plane::new(&self.luma, 8, 1),
                Plane::new(&self.u, 4, 1),
                Plane::new(&self.v, 4, 1),
            ],
        }
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async move {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout")
        .expect("server gone")
}

// ── Round trip ───────────────────────────────────────────────────

#[tokio::test]
async fn test_frame_round_trip_draws_overlay() {
    let (url, mut events) = spawn_server(Reply::Keypoints).await;
    let (s, mut overlays) = session(&url);
    let img = TestImage::new();

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));

    let outcome = s.on_frame(&img.image());
    assert!(matches!(outcome, FrameOutcome::Sent { bytes: 40 }));

    let ServerEvent::Frame(frame) = next_event(&mut events).await else {
        panic!("expected a frame");
    };
    assert_eq!((frame.header.width, frame.header.height), (4, 4));
    assert_eq!(frame.header.rotation, Rotation::Deg0);
    assert_eq!(frame.payload.len(), 24);
    // nearest-neighbour picks every second luma sample of every second row
    assert_eq!(&frame.payload[..4], &[0, 2, 4, 6]);

    let overlay = tokio::time::timeout(Duration::from_secs(5), overlays.recv())
        .await
        .expect("timeout")
        .expect("sink dropped");
    assert_eq!(overlay.points.len(), 2);
    assert_eq!(overlay.edges, vec![(0, 1)]);
    assert_eq!(overlay.label.as_deref(), Some("test"));
    assert!(overlay.timing.delay_ms.is_some());
    assert!(overlay.timing.fps.is_none());

    let stats = s.stats();
    assert_eq!(stats.frames_sent, 1);
    assert_eq!(stats.responses, 1);
    s.disconnect();
}

// ── Flow control ─────────────────────────────────────────────────

#[tokio::test]
async fn test_outstanding_request_blocks_until_timeout() {
    let (url, _events) = spawn_server(Reply::Silent).await;
    let (s, _overlays) = session(&url);
    let img = TestImage::new();

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;

    assert!(s.on_frame(&img.image()).is_sent());
    assert!(matches!(
        s.on_frame(&img.image()),
        FrameOutcome::Dropped(DropReason::RateLimited)
    ));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(matches!(
        s.on_frame(&img.image()),
        FrameOutcome::Dropped(DropReason::AwaitingResponse)
    ));

    tokio::time::sleep(Duration::from_millis(220)).await;
    assert!(s.on_frame(&img.image()).is_sent());
    assert_eq!(s.stats().frames_sent, 2);
    s.disconnect();
}

#[tokio::test]
async fn test_response_releases_next_frame() {
    let (url, mut events) = spawn_server(Reply::Keypoints).await;
    let (s, mut overlays) = session(&url);
    let img = TestImage::new();

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;

    for _ in 0..3 {
        assert!(s.on_frame(&img.image()).is_sent());
        tokio::time::timeout(Duration::from_secs(5), overlays.recv())
            .await
            .expect("timeout")
            .expect("sink dropped");
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let mut frames = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ServerEvent::Frame(_)) {
            frames += 1;
        }
    }
    assert_eq!(frames, 3);
    assert_eq!(s.stats().responses, 3);
    s.disconnect();
}

// ── Reconnection ─────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (url, mut events) = spawn_server(Reply::CloseAfterFrame).await;
    let (s, _overlays) = session(&url);
    let img = TestImage::new();

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(s.on_frame(&img.image()).is_sent());

    wait_for(|| {
        let stats = s.stats();
        stats.reconnect_attempts >= 1 && stats.state == ConnectionState::Connected
    })
    .await;

    let mut accepted = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ServerEvent::Accepted) {
            accepted += 1;
        }
    }
    assert!(accepted >= 2);

    // accounting from the dead link is gone; the next frame goes out
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(s.on_frame(&img.image()).is_sent());
    s.disconnect();
}

#[tokio::test]
async fn test_connect_failure_schedules_backoff() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);

    let (s, _overlays) = session(&url);
    s.connect();
    wait_for(|| s.stats().reconnect_attempts >= 2).await;

    s.disconnect();
    assert_eq!(s.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_backoff_restarts_after_a_successful_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}/ws");
    drop(listener);

    let (s, _overlays) = session_with(SessionConfig {
        backoff: BackoffPolicy {
            initial: Duration::from_millis(20),
            multiplier: 2,
            max: Duration::from_secs(1),
        },
        ..config(&url)
    });
    s.connect();

    // refused twice: the third delay has grown past the initial one
    wait_for(|| {
        let stats = s.stats();
        stats.reconnect_attempts >= 2
            && stats.retry_delay.is_some_and(|d| d >= Duration::from_millis(80))
    })
    .await;

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut events = serve(listener, Reply::CloseOnAccept);
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));

    // the link opened and closed; backoff starts over
    wait_for(|| s.stats().retry_delay == Some(Duration::from_millis(20))).await;
    s.disconnect();
}

#[tokio::test]
async fn test_response_after_disconnect_is_discarded() {
    let (url, mut events) = spawn_server(Reply::Delayed(Duration::from_millis(100))).await;
    let (s, mut overlays) = session(&url);
    let img = TestImage::new();

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(s.on_frame(&img.image()).is_sent());
    s.disconnect();

    // the queued frame still reaches the server before the link closes
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));
    assert!(matches!(next_event(&mut events).await, ServerEvent::Frame(_)));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(overlays.try_recv().is_err());
    let stats = s.stats();
    assert_eq!(stats.responses, 0);
    assert_eq!(stats.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_is_final_and_idempotent() {
    let (url, mut events) = spawn_server(Reply::Keypoints).await;
    let (s, _overlays) = session(&url);

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));

    s.disconnect();
    s.disconnect();
    assert_eq!(s.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(s.state(), ConnectionState::Disconnected);
    assert!(events.try_recv().is_err());
    assert_eq!(s.stats().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_reachability_gates_reconnection() {
    let (url, mut events) = spawn_server(Reply::Keypoints).await;
    let (s, _overlays) = session(&url);

    s.connect();
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));

    s.set_network_reachable(false);
    assert_eq!(s.state(), ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(s.state(), ConnectionState::Disconnected);

    s.set_network_reachable(true);
    wait_for(|| s.state() == ConnectionState::Connected).await;
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted));
    s.disconnect();
}

#[tokio::test]
async fn test_frames_dropped_when_not_connected() {
    let (s, _overlays) = session("ws://127.0.0.1:9/ws");
    let img = TestImage::new();

    assert!(matches!(
        s.on_frame(&img.image()),
        FrameOutcome::Dropped(DropReason::NotConnected)
    ));
    assert_eq!(s.stats().frames_dropped, 1);
}
