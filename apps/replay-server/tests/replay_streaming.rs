//! Replay Streaming Integration Tests
//!
//! Serves the API on an ephemeral port, connects WebSocket subscribers, and
//! replays a session document read from disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use replay_server::infrastructure::http::router;
use replay_server::{
    ApiServer, AppState, BroadcastPort, ChannelHub, EventStore, JsonDirEventStore, ReplayService,
    ReplaySettings, SharedClock, SystemClock,
};

type Subscriber = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn document() -> Value {
    json!({
        "session_id": "exercise-7",
        "start_time": "2024-12-06 11:00:00",
        "participated_soldiers": [
            {
                "soldier_id": 101,
                "call_sign": "Viper",
                "team": "RED",
                "location": [
                    { "latitude": 12.9, "longitude": 77.5, "timestamp": "2024-12-06T11:00:00.000000" },
                    { "latitude": 12.91, "longitude": 77.51, "timestamp": "2024-12-06T11:00:01.000000" },
                    { "latitude": 12.92, "longitude": 77.52, "timestamp": "2024-12-06T11:00:02.000000" }
                ],
                "orientation": [
                    { "roll": 0.0, "pitch": 1.0, "yaw": 90.0, "timestamp": "2024-12-06T11:00:00.000000" },
                    { "roll": 0.0, "pitch": 1.0, "yaw": 91.0, "timestamp": "2024-12-06T11:00:01.000000" },
                    { "roll": 0.0, "pitch": 1.0, "yaw": 92.0, "timestamp": "2024-12-06T11:00:02.000000" }
                ],
                "stats": [
                    { "kill_count": 1, "bullets_fired": 12, "timestamp": "2024-12-06T11:00:02Z" }
                ]
            },
            {
                "soldier_id": "202",
                "call_sign": "Ghost",
                "team": "blue",
                "location": [],
                "orientation": []
            }
        ],
        "events": [
            {
                "attacker_id": "101",
                "attacker_call_sign": "Viper",
                "victim_id": "202",
                "victim_call_sign": "Ghost",
                "distance_to_victim (in meters)": 85.5,
                "timestamp": { "$date": "2024-12-06T11:00:01.500Z" }
            }
        ]
    })
}

struct Harness {
    base: String,
    state: AppState,
    service: Arc<ReplayService>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

async fn start() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("exercise-7.json"),
        serde_json::to_vec(&document()).unwrap(),
    )
    .unwrap();

    let clock: SharedClock = Arc::new(SystemClock);
    let store: Arc<dyn EventStore> = Arc::new(JsonDirEventStore::new(dir.path(), Arc::clone(&clock)));
    let hub = Arc::new(ChannelHub::default());
    let port: Arc<dyn BroadcastPort> = hub.clone();
    let service = Arc::new(ReplayService::new(store, port, clock, ReplaySettings::default()));
    let cancel = CancellationToken::new();
    let state = AppState::new(Arc::clone(&service), hub, cancel.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_state = state.clone();
    let server = tokio::spawn(async move {
        ApiServer::serve(listener, serve_state).await.unwrap();
    });

    Harness {
        base: format!("ws://{addr}"),
        state,
        service,
        cancel,
        server,
        _dir: dir,
    }
}

async fn subscribe(harness: &Harness, topic: &str) -> Subscriber {
    let (mut socket, _) = connect_async(format!("{}/ws/{topic}", harness.base))
        .await
        .unwrap();
    let hello = next_json(&mut socket).await;
    assert_eq!(
        hello,
        json!({ "type": "connection", "status": "connected", "service": topic })
    );
    socket
}

async fn next_json(socket: &mut Subscriber) -> Value {
    loop {
        let message = timeout(Duration::from_secs(10), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .expect("socket error");
        if message.is_text() {
            return serde_json::from_str(message.to_text().unwrap()).unwrap();
        }
    }
}

async fn post(harness: &Harness, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::post(uri).body(Body::empty()).unwrap(),
    };
    let response = router(harness.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn replays_session_to_subscribers_in_order() {
    let harness = start().await;
    let mut raw = subscribe(&harness, "raw").await;
    let mut killfeed = subscribe(&harness, "killfeed").await;
    let mut stats = subscribe(&harness, "stats").await;

    let (status, body) = post(&harness, "/select_session/exercise-7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Replay started");

    let mut yaws = Vec::new();
    for _ in 0..3 {
        let movement = next_json(&mut raw).await;
        assert_eq!(movement["type"], "soldier_movement");
        assert_eq!(movement["soldier_id"], "101");
        assert_eq!(movement["team"], "red");
        yaws.push(movement["orientation"]["yaw"].as_f64().unwrap());
    }
    assert_eq!(yaws, [90.0, 91.0, 92.0]);

    let kill = next_json(&mut killfeed).await;
    assert_eq!(kill["type"], "kill_feed");
    assert_eq!(kill["victim_call_sign"], "Ghost");
    assert_eq!(kill["distance_to_victim"], 85.5);

    let stat = next_json(&mut stats).await;
    assert_eq!(stat["type"], "stats");
    assert_eq!(stat["kills"], 1);
    assert_eq!(stat["bullets_fired"], 12);
    assert_eq!(stat["health"], 100.0);

    harness.service.shutdown().await;
    harness.cancel.cancel();
    harness.server.await.unwrap();
}

#[tokio::test]
async fn seek_pushes_snapshot_to_subscribers() {
    let harness = start().await;
    let mut raw = subscribe(&harness, "raw").await;

    post(&harness, "/select_session/exercise-7", None).await;
    let first = next_json(&mut raw).await;
    assert_eq!(first["orientation"]["yaw"], 90.0);
    post(&harness, "/control/exercise-7", Some(json!({ "command": "pause" }))).await;

    let (status, body) = post(
        &harness,
        "/control/exercise-7",
        Some(json!({ "command": "skip", "n_seconds": 1.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "skip");

    let snapshot = next_json(&mut raw).await;
    assert_eq!(snapshot["orientation"]["yaw"], 91.0);

    let (status, _) = post(&harness, "/control/exercise-7", Some(json!({ "command": "stop" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.service.active_session().await, None);

    harness.cancel.cancel();
    harness.server.await.unwrap();
}

#[tokio::test]
async fn unknown_topic_is_rejected() {
    let harness = start().await;
    assert!(connect_async(format!("{}/ws/orders", harness.base)).await.is_err());

    harness.cancel.cancel();
    harness.server.await.unwrap();
}
