//! Integration tests for the WebSocket endpoint and the internal HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chat_hub::clients::{ChatDirectory, InMemoryChatDirectory};
use chat_hub::config::Config;
use chat_hub::routes::create_router;
use chat_hub::services::auth_service::{sign_jwt, JwtTokenValidator};
use chat_hub::state::AppState;
use chat_hub::ws::{ChatHub, HubSettings};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> Config {
    Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

fn test_state(config: Config, directory: Option<Arc<dyn ChatDirectory>>) -> AppState {
    let config = Arc::new(config);
    let hub = ChatHub::start(HubSettings::from(config.as_ref()), CancellationToken::new());
    AppState::new(config, hub, Arc::new(JwtTokenValidator::new(SECRET)), directory)
}

/// Start the server on a random port.
async fn start_test_server(state: AppState) -> SocketAddr {
    let app = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn expires() -> i64 {
    chrono::Utc::now().timestamp() + 300
}

fn user_token(user_id: i64) -> String {
    sign_jwt(&json!({"sub": user_id.to_string(), "type": "user", "exp": expires()}), SECRET).unwrap()
}

fn service_token() -> String {
    sign_jwt(&json!({"sub": "chat-service", "type": "service", "exp": expires()}), SECRET).unwrap()
}

async fn connect(addr: SocketAddr, user_id: i64) -> WsStream {
    let url = format!("ws://{}/ws?token={}", addr, user_token(user_id));
    let (ws, _) = connect_async(url).await.expect("WebSocket connect failed");
    ws
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read until the socket stays quiet for a moment.
async fn drain(ws: &mut WsStream) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
        if let Message::Text(text) = msg {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    events
}

/// Connect and wait until the hub has registered the connection.
async fn connect_ready(addr: SocketAddr, user_id: i64) -> WsStream {
    let mut ws = connect(addr, user_id).await;
    loop {
        if recv_json(&mut ws).await["type"] == "online_users_list" {
            return ws;
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn types(events: &[Value]) -> Vec<&str> {
    events.iter().filter_map(|e| e["type"].as_str()).collect()
}

#[tokio::test]
async fn connect_sends_ack_then_presence_snapshot() {
    let state = test_state(test_config(), None);
    let addr = start_test_server(state).await;

    let mut ws = connect(addr, 1).await;
    let connected = recv_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["user_id"], 1);
    assert!(connected["timestamp"].as_str().unwrap().ends_with('Z'));

    let online = recv_json(&mut ws).await;
    assert_eq!(online["type"], "user_online");
    assert_eq!(online["status"], "online");

    let list = recv_json(&mut ws).await;
    assert_eq!(list["type"], "online_users_list");
    assert_eq!(list["online_users"], json!([]));
    assert!(drain(&mut ws).await.is_empty(), "no users_last_seen without records");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let addr = start_test_server(test_state(test_config(), None)).await;
    let mut ws = connect_ready(addr, 1).await;
    drain(&mut ws).await;

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn oversized_frame_is_rejected_without_closing() {
    let addr = start_test_server(test_state(test_config(), None)).await;
    let mut ws = connect_ready(addr, 1).await;
    drain(&mut ws).await;

    let huge = json!({"type": "typing", "chat_id": 1, "padding": "x".repeat(600 * 1024)});
    send_json(&mut ws, huge).await;
    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "message_too_large");

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong", "exactly one error, then normal service");
}

#[tokio::test]
async fn rate_limited_frames_get_an_error() {
    let config = Config { rate_limit_max_messages: 3, ..test_config() };
    let addr = start_test_server(test_state(config, None)).await;
    let mut ws = connect_ready(addr, 1).await;
    drain(&mut ws).await;

    for _ in 0..3 {
        send_json(&mut ws, json!({"type": "ping"})).await;
        assert_eq!(recv_json(&mut ws).await["type"], "pong");
    }
    send_json(&mut ws, json!({"type": "ping"})).await;
    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "rate_limited");

    // Still connected: the next rejection arrives on the same socket.
    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["code"], "rate_limited");
}

#[tokio::test]
async fn invalid_tokens_are_rejected_before_upgrade() {
    let state = test_state(test_config(), None);
    let addr = start_test_server(state.clone()).await;

    let forged = sign_jwt(&json!({"sub": "1", "exp": expires()}), "someone-else").unwrap();
    for url in [
        format!("ws://{}/ws", addr),
        format!("ws://{}/ws?token=not-a-jwt", addr),
        format!("ws://{}/ws?token={}", addr, forged),
        format!("ws://{}/ws?token={}", addr, service_token()),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
            }
            other => panic!("expected 401, got {:?}", other.map(|(_, r)| r.status())),
        }
    }
    assert_eq!(state.hub.stats().await.total_connections, 0);
}

fn request_from_origin(addr: SocketAddr, origin: &str) -> tungstenite::handshake::client::Request {
    let mut request = format!("ws://{}/ws?token={}", addr, user_token(1))
        .into_client_request()
        .unwrap();
    request.headers_mut().insert("Origin", origin.parse().unwrap());
    request
}

#[tokio::test]
async fn origin_check_is_soft_unless_enforced() {
    let soft = Config {
        allowed_origins: Some("https://market.example".to_string()),
        ..test_config()
    };
    let addr = start_test_server(test_state(soft.clone(), None)).await;
    assert!(connect_async(request_from_origin(addr, "https://evil.example")).await.is_ok());

    let hard = Config { enforce_origin: true, ..soft };
    let addr = start_test_server(test_state(hard, None)).await;
    assert!(connect_async(request_from_origin(addr, "https://market.example")).await.is_ok());
    match connect_async(request_from_origin(addr, "https://evil.example")).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("expected 403, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn published_message_reaches_only_participants() {
    let state = test_state(test_config(), None);
    let addr = start_test_server(state.clone()).await;
    let mut alice = connect_ready(addr, 1).await;
    let mut bob = connect_ready(addr, 2).await;
    let mut carol = connect_ready(addr, 3).await;
    drain(&mut alice).await;
    drain(&mut bob).await;
    drain(&mut carol).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/internal/v1/events", addr))
        .bearer_auth(service_token())
        .json(&json!({
            "type": "new_message",
            "chat_id": 77,
            "message": {"id": 1, "chat_id": 77, "sender_id": 1, "receiver_id": 2, "content": "hi"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>().await.unwrap()["event"], "new_message");

    for ws in [&mut alice, &mut bob] {
        let event = recv_json(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["content"], "hi");
    }
    state.hub.sync().await;
    assert!(!types(&drain(&mut carol).await).contains(&"new_message"));
}

#[tokio::test]
async fn typing_goes_to_the_counterpart_only() {
    let directory = InMemoryChatDirectory::new().with_chat(5, 1, 2);
    let state = test_state(test_config(), Some(Arc::new(directory)));
    let addr = start_test_server(state.clone()).await;
    let mut buyer = connect_ready(addr, 1).await;
    let mut seller = connect_ready(addr, 2).await;
    let mut other = connect_ready(addr, 3).await;
    drain(&mut buyer).await;
    drain(&mut seller).await;
    drain(&mut other).await;

    send_json(&mut buyer, json!({"type": "typing", "payload": {"chat_id": 5}})).await;
    let typing = recv_json(&mut seller).await;
    assert_eq!(typing["type"], "user_typing");
    assert_eq!(typing["chat_id"], 5);
    assert_eq!(typing["user_id"], 1);
    assert_eq!(typing["is_typing"], true);

    state.hub.sync().await;
    assert!(drain(&mut other).await.is_empty());
    assert!(drain(&mut buyer).await.is_empty());
    assert_eq!(state.hub.typing_users_in_chat(5).await, vec![1]);
}

#[tokio::test]
async fn disconnect_broadcasts_offline_and_status() {
    let addr = start_test_server(test_state(test_config(), None)).await;
    let mut watcher = connect_ready(addr, 2).await;
    let mut leaving = connect_ready(addr, 1).await;
    drain(&mut watcher).await;

    leaving.close(None).await.unwrap();
    let offline = loop {
        let event = recv_json(&mut watcher).await;
        if event["type"] == "user_offline" {
            break event;
        }
    };
    assert_eq!(offline["user_id"], 1);
    assert_eq!(offline["status"], "offline");
    assert!(offline["last_seen"].as_str().is_some());

    send_json(&mut watcher, json!({"type": "get_user_status", "payload": {"user_id": 1}})).await;
    let status = recv_json(&mut watcher).await;
    assert_eq!(status["type"], "user_status");
    assert_eq!(status["status"], "offline");
    assert_eq!(status["last_seen"], offline["last_seen"]);

    // A new connection learns about the offline user from the snapshot.
    let mut late = connect_ready(addr, 3).await;
    let events = drain(&mut late).await;
    assert_eq!(types(&events), vec!["users_last_seen"]);
    assert_eq!(events[0]["users_last_seen"][0]["user_id"], 1);
}

#[tokio::test]
async fn logout_closes_the_connection() {
    let state = test_state(test_config(), None);
    let addr = start_test_server(state.clone()).await;
    let mut ws = connect_ready(addr, 1).await;
    drain(&mut ws).await;

    send_json(&mut ws, json!({"type": "logout"})).await;
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }

    for _ in 0..50 {
        state.hub.sync().await;
        if !state.hub.is_user_online(1).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user 1 is still online after logout");
}

#[tokio::test]
async fn internal_api_requires_a_service_token() {
    let state = test_state(test_config(), None);
    let app = create_router(state);

    let publish = |token: Option<String>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/internal/v1/events")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
            .body(Body::from(
                json!({"type": "typing", "chat_id": 1, "user_id": 1, "is_typing": true}).to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(publish(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(publish(Some(user_token(1)))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(publish(Some(service_token()))).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let stats = Request::builder()
        .uri("/internal/v1/stats")
        .header("authorization", format!("Bearer {}", service_token()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(stats).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["total_connections"], 0);
    assert_eq!(stats["typing_entries"], 1);
}
