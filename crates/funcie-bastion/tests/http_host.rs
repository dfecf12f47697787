#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use funcie_bastion::app_state::AppState;
use funcie_bastion::config;
use funcie_bastion::router::build_router;
use funcie_core::{ErrorCode, Message, MessageKind, Response};

async fn start(yaml: &str) -> SocketAddr {
    let state = AppState::with_redis(config::load_from_str(yaml).unwrap(), None).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, build_router(state)).await.unwrap() });
    addr
}

const MEMORY_SERVER: &str = "version: 1\nbastion:\n  transport: memory\n";

#[tokio::test]
async fn healthz_is_ok() {
    let addr = start(MEMORY_SERVER).await;
    let resp = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let addr = start(MEMORY_SERVER).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/dispatch"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(resp.text().await.unwrap().starts_with("invalid request: "));
}

#[tokio::test]
async fn dispatch_only_accepts_post() {
    let addr = start(MEMORY_SERVER).await;
    let resp = reqwest::get(format!("http://{addr}/dispatch")).await.unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn processor_failure_is_internal_error() {
    let addr = start(MEMORY_SERVER).await;
    let message = Message::new("app", MessageKind::Ping, None, Duration::from_secs(1));
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/dispatch"))
        .body(message.to_json().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp
        .text()
        .await
        .unwrap()
        .starts_with("internal server error: "));
}

#[tokio::test]
async fn register_on_server_bastion_is_internal_error() {
    let addr = start(MEMORY_SERVER).await;
    let message = Message::new("app", MessageKind::Register, None, Duration::from_secs(1));
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/dispatch"))
        .body(message.to_json().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn missing_consumer_is_proxied_failure() {
    let addr = start(MEMORY_SERVER).await;
    let message = Message::new(
        "app",
        MessageKind::ForwardRequest,
        Some(funcie_core::RawPayload::from_json(r#"{"body":1}"#).unwrap()),
        Duration::from_secs(1),
    );
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/dispatch"))
        .body(message.to_json().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = Response::from_slice(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(resp.id, message.id);
    assert!(resp.data.is_none());
    assert_eq!(resp.error.unwrap().code, ErrorCode::NoActiveConsumer);
}

#[tokio::test]
async fn ws_is_not_found_without_websocket_transport() {
    let addr = start(MEMORY_SERVER).await;
    let resp = reqwest::get(format!("http://{addr}/ws")).await.unwrap();
    assert_eq!(resp.status(), 404);
}
