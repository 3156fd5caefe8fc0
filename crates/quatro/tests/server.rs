//! Integration tests for the Quatro server: handshake, routing, and full
//! games over real WebSocket connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quatro::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let lobby = LobbyConfig {
        admin_snapshot_interval_secs: 0,
        bot_think_min_ms: 10,
        bot_think_max_ms: 20,
        bot_seed: Some(11),
        ..LobbyConfig::default()
    };
    let server = QuatroServerBuilder::new()
        .bind("127.0.0.1:0")
        .lobby_config(lobby)
        .build(DevTokenResolver, MemoryStore::new())
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, seq: u64, event: Value) {
    let frame = json!({ "seq": seq, "timestamp": 0, "event": event });
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next decoded envelope, or `None` once the server closes the socket.
async fn next_frame(ws: &mut ClientWs) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server should answer within 5s")?;
        match msg {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Skips frames until an event named `name` arrives and returns its body.
async fn wait_event(ws: &mut ClientWs, name: &str) -> Value {
    loop {
        let frame = next_frame(ws)
            .await
            .unwrap_or_else(|| panic!("closed while waiting for {name}"));
        if frame["event"]["event"] == name {
            return frame["event"].clone();
        }
    }
}

/// Waits for the `board_updated` that carries move number `count`.
async fn wait_board(ws: &mut ClientWs, count: u64) -> Value {
    loop {
        let update = wait_event(ws, "board_updated").await;
        if update["move_count"] == count {
            return update;
        }
    }
}

/// Connects and completes the handshake with a dev token.
async fn join(addr: &str, token: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(&mut ws, 1, json!({ "event": "hello", "token": token })).await;
    let ack = next_frame(&mut ws).await.expect("handshake ack");
    assert_eq!(ack["event"]["event"], "handshake_ack", "{ack}");
    ws
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success_sends_ack_then_state() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, 1, json!({ "event": "hello", "token": "7:alice:cat.png" })).await;

    let ack = next_frame(&mut ws).await.unwrap();
    assert_eq!(ack["seq"], 1);
    assert_eq!(ack["event"]["event"], "handshake_ack");
    assert_eq!(ack["event"]["participant_id"], 7);
    assert_eq!(ack["event"]["display_name"], "alice");
    assert_eq!(ack["event"]["is_privileged"], false);

    let snapshot = next_frame(&mut ws).await.unwrap();
    assert_eq!(snapshot["seq"], 2);
    assert_eq!(snapshot["event"]["event"], "queue_snapshot_updated");
    assert_eq!(snapshot["event"]["max_size"], 25);
}

#[tokio::test]
async fn test_handshake_bad_token_refused() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, 1, json!({ "event": "hello", "token": "not-a-number" })).await;

    let refusal = next_frame(&mut ws).await.unwrap();
    assert_eq!(refusal["event"]["event"], "error");
    assert_eq!(refusal["event"]["message"], "unauthorized");
    assert!(next_frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_handshake_other_event_first_refused() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, 1, json!({ "event": "join_queue" })).await;

    let refusal = next_frame(&mut ws).await.unwrap();
    assert_eq!(refusal["event"]["message"], "expected hello");
    assert!(next_frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_handshake_second_connection_refused() {
    let addr = start_server().await;
    let _first = join(&addr, "3:carol").await;

    let mut second = connect(&addr).await;
    send(&mut second, 1, json!({ "event": "hello", "token": "3:carol" })).await;
    let refusal = next_frame(&mut second).await.unwrap();
    assert_eq!(refusal["event"]["event"], "error");
    assert!(next_frame(&mut second).await.is_none());
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_malformed_frame_answered_with_error() {
    let addr = start_server().await;
    let mut ws = join(&addr, "1:alice").await;

    ws.send(Message::Text("{ nope".to_owned().into())).await.unwrap();
    let error = wait_event(&mut ws, "error").await;
    assert_eq!(error["message"], "malformed or unknown event");

    // The connection survives.
    send(&mut ws, 2, json!({ "event": "join_queue" })).await;
    let result = wait_event(&mut ws, "request_result").await;
    assert_eq!(result["request"], "join_queue");
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn test_admin_request_by_user_not_permitted() {
    let addr = start_server().await;
    let mut ws = join(&addr, "1:alice").await;

    send(&mut ws, 2, json!({ "event": "clear_queue" })).await;
    let result = wait_event(&mut ws, "request_result").await;
    assert_eq!(result["request"], "clear_queue");
    assert_eq!(result["ok"], false);
    assert!(result["message"].is_string());
}

#[tokio::test]
async fn test_admin_snapshot_for_privileged() {
    let addr = start_server().await;
    let _alice = join(&addr, "1:alice").await;
    let mut admin = join(&addr, "9:root::admin").await;

    send(&mut admin, 2, json!({ "event": "admin_snapshot" })).await;
    // One snapshot arrives on connect; wait for the one with both online.
    loop {
        let snapshot = wait_event(&mut admin, "admin_snapshot").await;
        if snapshot["online_count"] == 2 {
            assert_eq!(snapshot["online_users"].as_array().unwrap().len(), 2);
            break;
        }
    }
}

// =========================================================================
// Full games
// =========================================================================

#[tokio::test]
async fn test_human_pair_game_to_a_win() {
    let addr = start_server().await;
    let mut x = join(&addr, "1:xavier").await;
    let mut y = join(&addr, "2:yara").await;

    send(&mut x, 2, json!({ "event": "join_queue" })).await;
    wait_event(&mut x, "request_result").await;
    send(&mut y, 2, json!({ "event": "join_queue" })).await;

    let started = wait_event(&mut x, "session_started").await;
    assert_eq!(started["you_are"], "a");
    assert_eq!(started["turn"], json!({ "human": 1 }));
    let session_id = started["session_id"].clone();
    let for_y = wait_event(&mut y, "session_started").await;
    assert_eq!(for_y["session_id"], session_id);
    assert_eq!(for_y["opponent"]["display_name"], "xavier");

    // x stacks column 0, y stacks column 1; x gets four first.
    let mut seq = 3;
    for round in 0..3 {
        send(&mut x, seq, json!({ "event": "submit_move", "session_id": session_id, "column": 0 }))
            .await;
        wait_board(&mut y, 2 * round + 1).await;
        send(&mut y, seq, json!({ "event": "submit_move", "session_id": session_id, "column": 1 }))
            .await;
        wait_board(&mut x, 2 * round + 2).await;
        seq += 1;
    }

    // Out of turn.
    send(&mut y, seq, json!({ "event": "submit_move", "session_id": session_id, "column": 1 }))
        .await;
    let rejected = wait_event(&mut y, "move_rejected").await;
    assert_eq!(rejected["session_id"], session_id);

    send(&mut x, seq, json!({ "event": "submit_move", "session_id": session_id, "column": 0 }))
        .await;
    let finished = wait_event(&mut y, "session_finished").await;
    assert_eq!(finished["winner"], json!({ "human": 1 }));
    assert_eq!(finished["reason"], "win");
    assert_eq!(finished["draw"], false);

    let board = wait_event(&mut x, "leaderboard_updated").await;
    let rows = board["rows"].as_array().unwrap();
    assert!(!rows.is_empty());
}

#[tokio::test]
async fn test_bot_game_bot_answers() {
    let addr = start_server().await;
    let mut ws = join(&addr, "5:eve").await;

    send(&mut ws, 2, json!({ "event": "start_bot_session", "difficulty": "hard" })).await;
    let started = wait_event(&mut ws, "session_started").await;
    assert_eq!(started["mode"], "human_vs_bot");
    assert_eq!(started["difficulty"], "hard");
    assert_eq!(started["opponent"]["seat"], "bot");
    let session_id = started["session_id"].clone();

    send(&mut ws, 3, json!({ "event": "submit_move", "session_id": session_id, "column": 3 })).await;
    let update = wait_board(&mut ws, 2).await;
    assert_eq!(update["last_move"]["seat"], "bot");
    assert_eq!(update["turn"], json!({ "human": 5 }));
}

#[tokio::test]
async fn test_socket_close_forfeits_session() {
    let addr = start_server().await;
    let mut x = join(&addr, "1:xavier").await;
    let mut y = join(&addr, "2:yara").await;

    send(&mut x, 2, json!({ "event": "join_queue" })).await;
    wait_event(&mut x, "request_result").await;
    send(&mut y, 2, json!({ "event": "join_queue" })).await;
    wait_event(&mut x, "session_started").await;
    wait_event(&mut y, "session_started").await;

    y.close(None).await.unwrap();
    let finished = wait_event(&mut x, "session_finished").await;
    assert_eq!(finished["winner"], json!({ "human": 1 }));
    assert_eq!(finished["reason"], "disconnect");

    // The same participant may connect again once the old socket is gone.
    let _y_again = join(&addr, "2:yara").await;
}
