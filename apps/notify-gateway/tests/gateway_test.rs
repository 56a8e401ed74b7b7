mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use notify_gateway::gateway::payload::NotificationPayload;

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_raw(addr: SocketAddr, token: Option<&str>) -> WsClient {
    let url = match token {
        Some(token) => format!("ws://{addr}/notifications?token={token}"),
        None => format!("ws://{addr}/notifications"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

async fn expect_close(ws: &mut WsClient) -> Option<CloseCode> {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for close")
        .expect("stream ended")
        .expect("ws read error");
    match msg {
        tungstenite::Message::Close(frame) => frame.map(|f| f.code),
        other => panic!("Expected Close frame, got: {other:?}"),
    }
}

/// Connect with a valid token and consume `connection-confirmed`.
async fn connect_as(addr: SocketAddr, user_id: &str) -> (WsClient, String) {
    let token = common::mint_token(user_id);
    let mut ws = connect_raw(addr, Some(token.as_str())).await;
    let confirmed = next_json(&mut ws).await;
    assert_eq!(confirmed["event"], "connection-confirmed");
    let socket_id = confirmed["data"]["socketId"].as_str().unwrap().to_string();
    (ws, socket_id)
}

async fn send_event(ws: &mut WsClient, event: serde_json::Value) {
    ws.send(tungstenite::Message::Text(event.to_string().into()))
        .await
        .expect("send event");
}

fn sample_payload(id: &str) -> NotificationPayload {
    NotificationPayload::new(serde_json::json!({
        "id": id,
        "type": "SERVICE_REQUEST_RECEIVED",
        "title": "New service request",
        "message": "A client wants to hire you",
        "actionUrl": "/requests/1",
        "read": false,
        "createdAt": "2026-01-01T00:00:00.000Z",
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_token_receives_connection_confirmed() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;

    let token = common::mint_token("u1");
    let mut ws = connect_raw(addr, Some(token.as_str())).await;
    let confirmed = next_json(&mut ws).await;

    assert_eq!(confirmed["event"], "connection-confirmed");
    let d = &confirmed["data"];
    assert_eq!(d["status"], "connected");
    assert_eq!(d["userId"], "u1");
    assert!(d["socketId"].as_str().unwrap().starts_with("conn_"));
    assert!(d["timestamp"].is_string());

    assert!(state.registry.is_connected("u1"));
}

#[tokio::test]
async fn authorization_header_is_accepted() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;

    let mut request = format!("ws://{addr}/notifications")
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", common::mint_token("u-header")).parse().unwrap(),
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");

    let confirmed = next_json(&mut ws).await;
    assert_eq!(confirmed["data"]["userId"], "u-header");
}

#[tokio::test]
async fn missing_credential_is_closed_without_registration() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;

    let mut ws = connect_raw(addr, None).await;
    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::from(4001));
    }
    assert_eq!(state.registry.count().connections, 0);
}

#[tokio::test]
async fn invalid_or_expired_token_is_rejected() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let before = state.registry.count();

    let mut ws = connect_raw(addr, Some("not-a-jwt")).await;
    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::from(4004));
    }

    let expired = common::mint_expired_token("u1");
    let mut ws = connect_raw(addr, Some(expired.as_str())).await;
    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::from(4004));
    }

    assert_eq!(state.registry.count(), before);
    assert!(!state.registry.is_connected("u1"));
}

#[tokio::test]
async fn ping_returns_pong() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    send_event(&mut ws, serde_json::json!({ "event": "ping", "data": {} })).await;
    let pong = next_json(&mut ws).await;
    assert_eq!(pong["event"], "pong");
    assert!(pong["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn mark_read_and_sync_are_acknowledged() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    send_event(
        &mut ws,
        serde_json::json!({
            "event": "notification:mark-read",
            "data": { "notificationId": "ntf_9" },
        }),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["event"], "notification:marked-read");
    assert_eq!(ack["data"]["notificationId"], "ntf_9");

    send_event(
        &mut ws,
        serde_json::json!({
            "event": "notification:sync-request",
            "data": { "lastSyncTime": "2026-01-01T00:00:00.000Z" }
        }),
    )
    .await;
    let sync = next_json(&mut ws).await;
    assert_eq!(sync["event"], "notification:sync-response");
    assert_eq!(sync["data"]["userId"], "u1");
    assert!(sync["data"]["requestedAt"].is_string());
}

#[tokio::test]
async fn emit_fans_out_to_every_device() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut phone, _) = connect_as(addr, "u1").await;
    let (mut laptop, _) = connect_as(addr, "u1").await;
    assert_eq!(state.registry.get("u1").len(), 2);

    let report = state.dispatcher.emit("u1", &sample_payload("ntf_1"));
    assert_eq!(report.delivered, 2);

    for ws in [&mut phone, &mut laptop] {
        let frame = next_json(ws).await;
        assert_eq!(frame["event"], "notification:new");
        assert_eq!(frame["data"]["notification"]["id"], "ntf_1");
        assert_eq!(frame["data"]["notification"]["actionUrl"], "/requests/1");
        assert!(frame["data"]["receivedAt"].is_string());
    }
}

#[tokio::test]
async fn broadcast_reaches_only_connected_users() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    let report = state
        .dispatcher
        .broadcast(["u1", "u2"], &sample_payload("ntf_2"));
    assert_eq!(report.users, 2);
    assert_eq!(report.reached_users, 1);
    assert_eq!(report.delivered, 1);

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["data"]["notification"]["id"], "ntf_2");
}

#[tokio::test]
async fn disconnect_unregisters_each_device() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut first, first_id) = connect_as(addr, "u1").await;
    let (mut second, second_id) = connect_as(addr, "u1").await;

    first.close(None).await.expect("close first");
    let registry = state.registry.clone();
    assert!(common::eventually(|| registry.get("u1") == vec![second_id.clone()]).await);
    assert!(!registry.get("u1").contains(&first_id));

    second.close(None).await.expect("close second");
    assert!(common::eventually(|| !registry.is_connected("u1")).await);
    assert_eq!(registry.count().users, 0);
}

#[tokio::test]
async fn logout_closes_and_unregisters() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    send_event(&mut ws, serde_json::json!({ "event": "logout" })).await;
    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::Normal);
    }
    let registry = state.registry.clone();
    assert!(common::eventually(|| !registry.is_connected("u1")).await);
}

#[tokio::test]
async fn malformed_frame_closes_connection() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    ws.send(tungstenite::Message::Text("{not json".into()))
        .await
        .expect("send");
    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::from(4000));
    }
    let registry = state.registry.clone();
    assert!(common::eventually(|| !registry.is_connected("u1")).await);
}

#[tokio::test]
async fn unknown_event_is_ignored() {
    let state = common::test_state();
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    send_event(&mut ws, serde_json::json!({ "event": "typing", "data": {} })).await;
    send_event(&mut ws, serde_json::json!({ "event": "ping" })).await;

    // The unknown event produces nothing; the next frame is the pong.
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["event"], "pong");
    assert!(state.registry.is_connected("u1"));
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(200);
    let state = common::test_state_with(config);
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    if let Some(code) = expect_close(&mut ws).await {
        assert_eq!(code, CloseCode::from(4009));
    }
    let registry = state.registry.clone();
    assert!(common::eventually(|| !registry.is_connected("u1")).await);
}

#[tokio::test]
async fn idle_close_lands_one_window_after_last_frame() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(200);
    let idle_timeout = config.idle_timeout();
    let state = common::test_state_with(config);
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    let started = time::Instant::now();
    let code = expect_close(&mut ws).await;
    let elapsed = started.elapsed();

    assert_eq!(code, Some(CloseCode::from(4009)));
    assert!(
        elapsed >= idle_timeout - Duration::from_millis(50),
        "closed too early: {elapsed:?}"
    );
    assert!(
        elapsed < idle_timeout + Duration::from_millis(250),
        "closed too late: {elapsed:?}"
    );
}

#[tokio::test]
async fn client_activity_pushes_idle_deadline_back() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(200);
    let state = common::test_state_with(config);
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    // 600ms of pings every 100ms, double the 300ms idle window.
    for _ in 0..6 {
        time::sleep(Duration::from_millis(100)).await;
        send_event(&mut ws, serde_json::json!({ "event": "ping" })).await;
        assert_eq!(next_json(&mut ws).await["event"], "pong");
    }
    assert!(state.registry.is_connected("u1"));
}

#[tokio::test]
async fn binary_frames_count_as_activity() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(200);
    let state = common::test_state_with(config);
    let addr = common::start_server(&state).await;
    let (mut ws, _) = connect_as(addr, "u1").await;

    for _ in 0..14 {
        ws.send(tungstenite::Message::Binary(vec![0u8, 1, 2].into()))
            .await
            .expect("send binary");
        time::sleep(Duration::from_millis(50)).await;
    }

    assert!(state.registry.is_connected("u1"));
    send_event(&mut ws, serde_json::json!({ "event": "ping" })).await;
    assert_eq!(next_json(&mut ws).await["event"], "pong");
}
