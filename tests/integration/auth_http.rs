// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! HTTP surface and WebSocket attach authorization.
//!
//! Covers:
//! - Registration and login happy paths and their failure statuses
//! - Login failures never reveal whether the account exists
//! - Attach refusal for garbage, forged, and expired tokens, and for a
//!   first frame that is not an attach request
//! - Image upload, retrieval via `/uploads`, and upload rejections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite;

use duochat_proto::event::{self, ClientEvent, ServerEvent};
use duochat_relay::auth::Claims;
use duochat_relay::config::RelayConfig;
use duochat_relay::relay::{self, RelayState};
use duochat_relay::store::InMemoryMessageStore;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// =============================================================================
// Helpers
// =============================================================================

/// Start the relay in-process on an OS-assigned port.
async fn start_relay() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server")
}

/// Start a relay whose uploads land in `dir` with the given size cap.
async fn start_relay_with_uploads(
    dir: &TempDir,
    max_upload_size: usize,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let config = RelayConfig {
        upload_dir: dir.path().to_path_buf(),
        max_upload_size,
        ..RelayConfig::default()
    };
    let state = Arc::new(RelayState::with_config(&config, InMemoryMessageStore::new()));
    relay::start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start relay server")
}

async fn register(
    client: &reqwest::Client,
    addr: SocketAddr,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{addr}/register"))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
}

async fn login(
    client: &reqwest::Client,
    addr: SocketAddr,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{addr}/login"))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
}

/// Send a client event on a tungstenite WebSocket.
async fn ws_send(ws: &mut WsStream, event: &ClientEvent) {
    let bytes = event::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

/// Receive the next server event, with a timeout.
async fn ws_recv(ws: &mut WsStream) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for server event")
        .expect("stream ended")
        .expect("websocket error");
    event::decode_server(&msg.into_data()).unwrap()
}

async fn ws_connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

/// Attach and expect an error frame back whose reason matches `needle`.
async fn attach_expect_refusal(addr: SocketAddr, token: &str, needle: &str) {
    let mut ws = ws_connect(addr).await;
    ws_send(
        &mut ws,
        &ClientEvent::Attach {
            token: token.to_string(),
        },
    )
    .await;
    match ws_recv(&mut ws).await {
        ServerEvent::Error { reason } => {
            assert!(reason.contains(needle), "reason {reason:?} lacks {needle:?}");
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn register_then_login_roundtrip() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();

    let resp = register(&client, addr, "alice", "hunter2").await;
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["username"], "alice");

    let resp = login(&client, addr, "alice", "hunter2").await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();

    assert_eq!(
        register(&client, addr, "alice", "hunter2").await.status(),
        reqwest::StatusCode::CREATED
    );
    let resp = register(&client, addr, "alice", "other-password").await;
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("exists"),
        "got {body}"
    );
}

#[tokio::test]
async fn empty_credentials_rejected() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();

    let resp = register(&client, addr, "", "hunter2").await;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let resp = register(&client, addr, "alice", "").await;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();
    register(&client, addr, "alice", "hunter2").await;

    let wrong_password = login(&client, addr, "alice", "wrong").await;
    assert_eq!(wrong_password.status(), reqwest::StatusCode::UNAUTHORIZED);
    let wrong_body: serde_json::Value = wrong_password.json().await.unwrap();

    let unknown_user = login(&client, addr, "mallory", "wrong").await;
    assert_eq!(unknown_user.status(), reqwest::StatusCode::UNAUTHORIZED);
    let unknown_body: serde_json::Value = unknown_user.json().await.unwrap();

    // Same status, same message: no account enumeration.
    assert_eq!(wrong_body["error"], unknown_body["error"]);
}

// =============================================================================
// WebSocket attach authorization
// =============================================================================

#[tokio::test]
async fn attach_with_valid_token_succeeds() {
    let (addr, _handle) = start_relay().await;
    let client = reqwest::Client::new();
    register(&client, addr, "alice", "hunter2").await;
    let body: serde_json::Value = login(&client, addr, "alice", "hunter2")
        .await
        .json()
        .await
        .unwrap();
    let token = body["token"].as_str().unwrap();

    let mut ws = ws_connect(addr).await;
    ws_send(
        &mut ws,
        &ClientEvent::Attach {
            token: token.to_string(),
        },
    )
    .await;
    match ws_recv(&mut ws).await {
        ServerEvent::Attached { identity } => assert_eq!(identity, "alice"),
        other => panic!("expected Attached, got {other:?}"),
    }
}

#[tokio::test]
async fn attach_with_garbage_token_refused() {
    let (addr, _handle) = start_relay().await;
    attach_expect_refusal(addr, "not-a-token", "invalid token").await;
}

#[tokio::test]
async fn attach_with_foreign_signature_refused() {
    // Two independent relays never share a generated secret.
    let (addr_a, _handle_a) = start_relay().await;
    let (addr_b, _handle_b) = start_relay().await;

    let client = reqwest::Client::new();
    register(&client, addr_a, "alice", "hunter2").await;
    let body: serde_json::Value = login(&client, addr_a, "alice", "hunter2")
        .await
        .json()
        .await
        .unwrap();
    let token = body["token"].as_str().unwrap();

    attach_expect_refusal(addr_b, token, "invalid token").await;
}

#[tokio::test]
async fn attach_with_expired_token_refused() {
    let secret = "integration-test-secret";
    let config = RelayConfig {
        jwt_secret: Some(secret.to_string()),
        ..RelayConfig::default()
    };
    let state = Arc::new(RelayState::with_config(&config, InMemoryMessageStore::new()));
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start relay server");

    // Sign claims that expired an hour ago with the relay's own secret.
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let stale = Claims {
        sub: "alice".to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &stale,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();

    attach_expect_refusal(addr, &token, "expired").await;
}

#[tokio::test]
async fn first_frame_must_be_an_attach_request() {
    let (addr, _handle) = start_relay().await;

    let mut ws = ws_connect(addr).await;
    ws_send(&mut ws, &ClientEvent::PullUnread).await;
    match ws_recv(&mut ws).await {
        ServerEvent::Error { reason } => {
            assert!(reason.contains("attach"), "got: {reason}");
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =============================================================================
// Image upload
// =============================================================================

#[tokio::test]
async fn upload_and_fetch_image() {
    let dir = TempDir::new().unwrap();
    let (addr, _handle) = start_relay_with_uploads(&dir, 1024).await;
    let client = reqwest::Client::new();

    let image = vec![0x89u8, 0x50, 0x4E, 0x47, 1, 2, 3, 4];
    let part = reqwest::multipart::Part::bytes(image.clone()).file_name("photo.PNG");
    let form = reqwest::multipart::Form::new().part("image", part);

    let resp = client
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    let url = body["image_url"].as_str().unwrap();
    assert!(url.starts_with("/uploads/"), "got: {url}");
    assert!(url.ends_with(".png"), "extension not kept: {url}");

    // The returned path serves the exact bytes back.
    let resp = client
        .get(format!("http://{addr}{url}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), image.as_slice());
}

#[tokio::test]
async fn upload_without_image_field_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _handle) = start_relay_with_uploads(&dir, 1024).await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(vec![1, 2, 3]).file_name("photo.png");
    let form = reqwest::multipart::Form::new().part("file", part);

    let resp = client
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("image"),
        "got {body}"
    );
}

#[tokio::test]
async fn oversized_upload_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _handle) = start_relay_with_uploads(&dir, 1024).await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(vec![0u8; 2000]).file_name("big.png");
    let form = reqwest::multipart::Form::new().part("image", part);

    let resp = client
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn empty_upload_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _handle) = start_relay_with_uploads(&dir, 1024).await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(Vec::new()).file_name("empty.png");
    let form = reqwest::multipart::Form::new().part("image", part);

    let resp = client
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("empty"),
        "got {body}"
    );
}
