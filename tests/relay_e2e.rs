//! End-to-end relay scenarios over real WebSocket connections.
//!
//! Each test binds its own server on an ephemeral port, so player ids
//! always start at 1 within a test.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use wildmon_relay::{RelayConfig, RelayServer};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, Arc<RelayServer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RelayServer::new(RelayConfig::default()));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });
    (addr, server)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one with the given `type` tag arrives.
async fn recv_until(ws: &mut WsClient, msg_type: &str) -> Value {
    loop {
        let v = recv_json(ws).await;
        if v["type"] == msg_type {
            return v;
        }
    }
}

/// Skip frames until one with the given `type` tag satisfies `pred`.
async fn recv_until_matches(
    ws: &mut WsClient,
    msg_type: &str,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            let v = recv_until(ws, msg_type).await;
            if pred(&v) {
                return v;
            }
        }
    })
    .await
    .expect("timed out waiting for a matching message")
}

/// Consume the fixed bootstrap sequence and return the assigned id.
async fn handshake(ws: &mut WsClient) -> u64 {
    let registered = recv_json(ws).await;
    assert_eq!(registered["type"], "registered");
    let id = registered["id"].as_u64().unwrap();

    let players = recv_json(ws).await;
    assert_eq!(players["type"], "players_update");
    // Our own (seeded) entry is already present.
    assert!(players["players"][id.to_string()].is_object());

    let chat = recv_json(ws).await;
    assert_eq!(chat["type"], "chat_update");

    id
}

#[tokio::test]
async fn test_bootstrap_sequence_and_sequential_ids() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    assert_eq!(id_a, 1);

    let mut b = connect(addr).await;
    let id_b = handshake(&mut b).await;
    assert_eq!(id_b, 2);
}

#[tokio::test]
async fn test_presence_update_reaches_everyone() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    handshake(&mut a).await;
    let mut b = connect(addr).await;
    handshake(&mut b).await;

    send_json(
        &mut a,
        json!({
            "type": "player_update",
            "x": 10, "y": 20, "map": "m", "direction": "down", "is_moving": true
        }),
    )
    .await;

    let seen = |v: &Value| {
        let p = &v["players"]["1"];
        p["x"] == 10.0 && p["y"] == 20.0 && p["map"] == "m" && p["is_moving"] == true
    };
    recv_until_matches(&mut a, "players_update", seen).await;
    recv_until_matches(&mut b, "players_update", seen).await;
}

#[tokio::test]
async fn test_battle_challenge_accept_flow() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    let mut b = connect(addr).await;
    let id_b = handshake(&mut b).await;

    send_json(
        &mut a,
        json!({
            "type": "battle_challenge",
            "target_id": id_b,
            "monster_data": {"name": "Pika"}
        }),
    )
    .await;

    let received = recv_until(&mut b, "battle_challenge_received").await;
    assert_eq!(received["from"], id_a);
    assert_eq!(received["opponent_monster"]["name"], "Pika");

    send_json(
        &mut b,
        json!({
            "type": "battle_accept",
            "challenger_id": id_a,
            "monster_data": {"name": "Bulba"}
        }),
    )
    .await;

    let start_a = recv_until(&mut a, "battle_start").await;
    assert_eq!(start_a["opponent_id"], id_b);
    assert_eq!(start_a["opponent_monster"]["name"], "Bulba");

    let start_b = recv_until(&mut b, "battle_start").await;
    assert_eq!(start_b["opponent_id"], id_a);
    assert_eq!(start_b["opponent_monster"]["name"], "Pika");
}

#[tokio::test]
async fn test_battle_decline_notifies_challenger() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    let mut b = connect(addr).await;
    let id_b = handshake(&mut b).await;

    send_json(
        &mut a,
        json!({"type": "battle_challenge", "target_id": id_b}),
    )
    .await;
    recv_until(&mut b, "battle_challenge_received").await;

    send_json(&mut b, json!({"type": "battle_decline", "challenger_id": id_a})).await;

    let declined = recv_until(&mut a, "battle_declined").await;
    assert_eq!(declined["by"], id_b);
}

#[tokio::test]
async fn test_chat_roundtrip_and_empty_rejection() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    let mut b = connect(addr).await;
    handshake(&mut b).await;

    send_json(&mut a, json!({"type": "chat_send", "text": "  hello  "})).await;

    for ws in [&mut a, &mut b] {
        let update = recv_until(ws, "chat_update").await;
        let msg = &update["messages"][0];
        assert_eq!(msg["id"], 1);
        assert_eq!(msg["from"], id_a);
        assert_eq!(msg["text"], "hello");
    }

    // Whitespace-only text is rejected with an error to the sender only.
    send_json(&mut a, json!({"type": "chat_send", "text": "   "})).await;
    let err = recv_until(&mut a, "error").await;
    assert_eq!(err["message"], "empty_message");

    // The log did not grow: the next accepted message gets id 2.
    send_json(&mut b, json!({"type": "chat_send", "text": "world"})).await;
    let update = recv_until(&mut a, "chat_update").await;
    assert_eq!(update["messages"][0]["id"], 2);
    assert_eq!(update["messages"][0]["text"], "world");
}

#[tokio::test]
async fn test_malformed_frames_get_error_reply_and_connection_survives() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    handshake(&mut a).await;

    a.send(Message::Text("{not json".to_string())).await.unwrap();
    let err = recv_until(&mut a, "error").await;
    assert_eq!(err["message"], "invalid_json");

    // Wrong field type: parseable JSON, unparseable message.
    send_json(&mut a, json!({"type": "chat_send", "text": 42})).await;
    let err = recv_until(&mut a, "error").await;
    assert_ne!(err["message"], "invalid_json");

    // Unknown types are ignored, and the connection still works.
    send_json(&mut a, json!({"type": "teleport", "x": 1})).await;
    send_json(&mut a, json!({"type": "chat_send", "text": "still here"})).await;
    let update = recv_until(&mut a, "chat_update").await;
    assert_eq!(update["messages"][0]["text"], "still here");
}

#[tokio::test]
async fn test_disconnect_removes_player_from_broadcasts() {
    let (addr, _server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    let mut b = connect(addr).await;
    handshake(&mut b).await;

    // B sees A while A is connected.
    recv_until_matches(&mut b, "players_update", |v| {
        v["players"][id_a.to_string()].is_object()
    })
    .await;

    a.close(None).await.unwrap();
    drop(a);

    // After teardown, broadcasts no longer contain A.
    recv_until_matches(&mut b, "players_update", |v| {
        v["players"][id_a.to_string()].is_null()
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_clears_challenge_keyed_by_leaver() {
    let (addr, server) = start_server().await;

    let mut a = connect(addr).await;
    let id_a = handshake(&mut a).await;
    let mut b = connect(addr).await;
    handshake(&mut b).await;

    // B challenges A, so the pending challenge is keyed by A's id.
    send_json(
        &mut b,
        json!({
            "type": "battle_challenge",
            "target_id": id_a,
            "monster_data": {"name": "Pika"}
        }),
    )
    .await;
    recv_until(&mut a, "battle_challenge_received").await;
    assert!(server.stores().challenges.get_challenge(id_a).await.is_some());

    a.close(None).await.unwrap();
    drop(a);

    // Teardown is asynchronous; poll until the challenge disappears.
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            if server.stores().challenges.get_challenge(id_a).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("challenge keyed by the leaver was not cleared");
}
