use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use lansend_core::http_server::create_router;
use lansend_core::{DeviceInfo, ReceiverState};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

fn app(dir: &Path) -> (Router, Arc<ReceiverState>) {
    let me = DeviceInfo {
        device_id: "receiver-1".to_string(),
        alias: "LanSend Rust Receiver".to_string(),
        port: 56789,
        ..DeviceInfo::default()
    };
    let state = Arc::new(ReceiverState::new(me, "123456", dir));
    let router = create_router(state.clone(), 1024 * 1024)
        .layer(MockConnectInfo(SocketAddr::from(([192, 168, 1, 20], 50000))));
    (router, state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_chunk(uri: &str, session_id: &str, bytes: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .header("X-Session-ID", session_id)
        .body(Body::from(bytes))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    assert_eq!(response.headers().get("connection").unwrap(), "close");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn connect_body(pin: &str) -> Value {
    json!({
        "pin_code": pin,
        "device_info": {
            "device_id": "sender-1",
            "alias": "Python Sender",
            "hostname": "laptop",
            "operating_system": "linux",
            "ip_address": "192.168.1.20",
            "port": 56790,
            "device_type": "laptop",
            "device_model": "Test"
        }
    })
}

#[tokio::test]
async fn test_full_transfer_over_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());

    let (status, body) = send(&router, post_json("/connect", connect_body("123456"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Connection accepted");
    assert_eq!(body["device_info"]["device_id"], "receiver-1");

    let (status, body) = send(
        &router,
        post_json(
            "/request-send",
            json!({
                "session_id": "s1",
                "files": { "f1": { "name": "a.txt", "size": 5, "type": "text/plain" } }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "session_id": "s1", "accepted_files": { "f1": true } }));

    let (status, body) = send(&router, post_chunk("/api/v1/file_data/f1", "s1", b"hel")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "receiving");
    assert_eq!(body["processed_bytes"], 3);

    // Short alias route
    let (status, body) = send(&router, post_chunk("/file_data/f1", "s1", b"lo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["processed_bytes"], 5);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["file_id"], "f1");

    let content = tokio::fs::read(dir.path().join("a.txt")).await.unwrap();
    assert_eq!(content, b"hello");
}

#[tokio::test]
async fn test_connect_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (router, state) = app(dir.path());

    let (status, body) = send(&router, post_json("/connect", connect_body("999999"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid PIN code");

    let (status, _) = send(&router, post_json("/connect", json!({ "pin_code": "123456" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/connect")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid JSON format");

    assert!(!state.pairing.is_paired().await);
}

#[tokio::test]
async fn test_request_send_without_pairing_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());

    let (status, body) = send(
        &router,
        post_json("/request-send", json!({ "session_id": "s1", "files": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("/connect"));
}

#[tokio::test]
async fn test_request_send_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());
    send(&router, post_json("/connect", connect_body("123456"))).await;

    let (status, _) = send(
        &router,
        post_json("/request-send", json!({ "session_id": "s1", "files": [1, 2] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, post_json("/request-send", json!({ "files": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chunk_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());
    send(&router, post_json("/connect", connect_body("123456"))).await;
    send(
        &router,
        post_json(
            "/request-send",
            json!({ "session_id": "s1", "files": { "f1": { "name": "a.txt", "size": 5 } } }),
        ),
    )
    .await;

    let (status, _) = send(&router, post_chunk("/api/v1/file_data/f1", "s2", b"hel")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, post_chunk("/api/v1/file_data/nope", "s1", b"hel")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/file_data/f1")
        .body(Body::from("hel"))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!dir.path().join("a.txt.part").exists());
}

#[tokio::test]
async fn test_cancel_send() {
    let dir = tempfile::tempdir().unwrap();
    let (router, state) = app(dir.path());

    let (status, _) = send(&router, post_json("/cancel-send", json!({ "session_id": "s1" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    send(&router, post_json("/connect", connect_body("123456"))).await;
    send(
        &router,
        post_json(
            "/request-send",
            json!({ "session_id": "s1", "files": { "f1": { "name": "a.txt", "size": 5 } } }),
        ),
    )
    .await;
    send(&router, post_chunk("/api/v1/file_data/f1", "s1", b"he")).await;

    let (status, body) = send(&router, post_json("/cancel-send", json!({ "session_id": "s1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session cancelled");
    assert!(!dir.path().join("a.txt.part").exists());
    assert!(state.sessions.current_session_id().await.is_none());
}

#[tokio::test]
async fn test_ping_and_unknown_route() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());

    let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "pong");
    assert_eq!(body["device_info"]["alias"], "LanSend Rust Receiver");

    let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn test_cors_preflight() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/file_data/f1")
        .header("Origin", "https://peer.local")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "x-session-id")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    let methods = headers
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"));
    let allowed = headers
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allowed.contains("x-session-id"));
}

#[tokio::test]
async fn test_size_sent_as_string() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(dir.path());
    send(&router, post_json("/connect", connect_body("123456"))).await;

    let (status, body) = send(
        &router,
        post_json(
            "/request-send",
            json!({ "session_id": "s1", "files": { "f1": { "name": "a.txt", "size": "5" } } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted_files"]["f1"], true);

    let (status, body) = send(&router, post_chunk("/api/v1/file_data/f1", "s1", b"hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
}
