//! WebSocket end-to-end tests
//!
//! Spawns the full router on an ephemeral port and drives it with
//! `tokio-tungstenite` clients.
//!
//! Run with: `cargo test --test websocket_integration_test -- --nocapture`

mod helpers;

use std::time::Duration;

use axum::http::Method;
use futures::{SinkExt, StreamExt};
use helpers::{spawn_test_server, TestApp, TestServer};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

async fn open(server: &TestServer, token: &str) -> Socket {
    let url = format!("ws://{}/ws?token={token}", server.addr);
    let (socket, _) = connect_async(url).await.expect("WebSocket connect failed");
    socket
}

/// Next JSON event, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let frame = socket
                .next()
                .await
                .expect("Socket closed")
                .expect("Socket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str::<Value>(text.as_str()).expect("Invalid event JSON");
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Skip events until one of type `name` arrives.
async fn wait_for(socket: &mut Socket, name: &str) -> Value {
    loop {
        let event = next_event(socket).await;
        if event["type"] == name {
            return event;
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let outcome = tokio::time::timeout(SILENCE_WINDOW, socket.next()).await;
    assert!(outcome.is_err(), "Expected no event, got {outcome:?}");
}

async fn send_event(socket: &mut Socket, event: Value) {
    socket
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send event");
}

fn online_ids(snapshot: &Value) -> Vec<String> {
    snapshot["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["userId"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_connect_receives_ready_then_snapshot() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;
    let (u1, t1) = app.create_user("alice").await;

    let mut socket = open(&server, &t1).await;

    let ready = next_event(&mut socket).await;
    assert_eq!(ready, json!({ "type": "ready", "data": { "userId": u1 } }));

    let snapshot = next_event(&mut socket).await;
    assert_eq!(snapshot["type"], "getOnlineUsers");
    assert_eq!(online_ids(&snapshot), vec![u1.to_string()]);
    assert_eq!(snapshot["data"][0]["status"], "online");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;

    let url = format!("ws://{}/ws?token=garbage", server.addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_direct_message_delivered_to_receiver_only() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;
    let (_, t1) = app.create_user("alice").await;
    let (u2, t2) = app.create_user("bob").await;
    let (u3, t3) = app.create_user("carol").await;

    let mut bob = open(&server, &t2).await;
    wait_for(&mut bob, "getOnlineUsers").await;
    let mut carol = open(&server, &t3).await;
    wait_for(&mut carol, "getOnlineUsers").await;

    // Bob sees carol come online
    let snapshot = wait_for(&mut bob, "getOnlineUsers").await;
    let mut expected = vec![u2.to_string(), u3.to_string()];
    expected.sort();
    assert_eq!(online_ids(&snapshot), expected);

    let resp = app
        .call_json(
            Method::POST,
            "/api/messages/send",
            &t1,
            json!({ "receiverId": u2, "content": "hello" }),
        )
        .await;
    assert_eq!(resp.status(), 201);

    let event = next_event(&mut bob).await;
    assert_eq!(event["type"], "newMessage");
    assert_eq!(event["data"]["content"], "hello");
    assert_eq!(event["data"]["isEncrypted"], false);
    assert_eq!(event["data"]["receiverId"], u2.to_string());

    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn test_ping_typing_and_status_relay() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;
    let (u1, t1) = app.create_user("alice").await;
    let (u2, t2) = app.create_user("bob").await;

    let mut alice = open(&server, &t1).await;
    wait_for(&mut alice, "getOnlineUsers").await;
    let mut bob = open(&server, &t2).await;
    wait_for(&mut bob, "getOnlineUsers").await;
    wait_for(&mut alice, "getOnlineUsers").await;

    send_event(&mut alice, json!({ "type": "ping" })).await;
    assert_eq!(next_event(&mut alice).await, json!({ "type": "pong" }));

    send_event(&mut alice, json!({ "type": "typing", "data": { "receiverId": u2 } })).await;
    let typing = next_event(&mut bob).await;
    assert_eq!(typing, json!({ "type": "userTyping", "data": { "userId": u1 } }));

    send_event(&mut alice, json!({ "type": "updateStatus", "data": { "status": "away" } })).await;
    let changed = wait_for(&mut bob, "userStatusChanged").await;
    assert_eq!(changed["data"]["userId"], u1.to_string());
    assert_eq!(changed["data"]["status"], "away");

    // Dropping the socket ends typing and presence for alice
    drop(alice);
    let stopped = wait_for(&mut bob, "userStoppedTyping").await;
    assert_eq!(stopped["data"]["userId"], u1.to_string());
    let snapshot = wait_for(&mut bob, "getOnlineUsers").await;
    assert_eq!(online_ids(&snapshot), vec![u2.to_string()]);
}

#[tokio::test]
async fn test_malformed_event_returns_error() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;
    let (_, t1) = app.create_user("alice").await;

    let mut socket = open(&server, &t1).await;
    wait_for(&mut socket, "getOnlineUsers").await;

    send_event(&mut socket, json!({ "type": "teleport" })).await;
    let error = next_event(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], "invalid_event");
}

#[tokio::test]
async fn test_group_channel_subscription() {
    let app = TestApp::new().await;
    let server = spawn_test_server(app.router.clone()).await;
    let (_, t_owner) = app.create_user("owner").await;
    let (m1, t_m1) = app.create_user("m1").await;

    let resp = app
        .call_json(
            Method::POST,
            "/api/groups/create",
            &t_owner,
            json!({ "name": "g1", "members": [m1] }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let group_id: Uuid = helpers::body_to_json(resp).await["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let mut member = open(&server, &t_m1).await;
    wait_for(&mut member, "getOnlineUsers").await;
    send_event(&mut member, json!({ "type": "joinGroup", "data": group_id.to_string() })).await;
    // Round-trip a ping so the subscription is in place before the send
    send_event(&mut member, json!({ "type": "ping" })).await;
    wait_for(&mut member, "pong").await;

    let resp = app
        .call_json(
            Method::POST,
            &format!("/api/messages/group/{group_id}"),
            &t_owner,
            json!({ "content": "welcome" }),
        )
        .await;
    assert_eq!(resp.status(), 201);

    let event = next_event(&mut member).await;
    assert_eq!(event["type"], "newGroupMessage");
    assert_eq!(event["data"]["groupId"], group_id.to_string());
    assert_eq!(event["data"]["content"], "welcome");

    send_event(&mut member, json!({ "type": "leaveGroup", "data": group_id.to_string() })).await;
    send_event(&mut member, json!({ "type": "ping" })).await;
    wait_for(&mut member, "pong").await;

    let resp = app
        .call_json(
            Method::POST,
            &format!("/api/messages/group/{group_id}"),
            &t_owner,
            json!({ "content": "anyone?" }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    assert_silent(&mut member).await;
}
