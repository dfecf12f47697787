#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use funcie_bastion::app_state::AppState;
use funcie_bastion::config;
use funcie_bastion::dispatch::{function_handler, ClientHandlerRouter};
use funcie_bastion::router::build_router;
use funcie_bastion::transport::websocket::{WebsocketConsumer, WebsocketDialer};
use funcie_bastion::transport::Consumer;
use funcie_core::protocol::payloads::{ForwardRequest, ForwardRequestMessage, ForwardRequestResponse};
use funcie_core::{ErrorCode, FuncieError, Message, MessageKind, RawPayload, Response};

const TOKEN: &str = "s3cret";

async fn start_server() -> (AppState, SocketAddr) {
    let cfg = config::load_from_str(&format!(
        "version: 1\nbastion:\n  transport: websocket\n  auth_token: \"{TOKEN}\"\n"
    ))
    .unwrap();
    let state = AppState::with_redis(cfg, None).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (state, addr)
}

fn consumer(addr: SocketAddr, token: &str) -> WebsocketConsumer {
    WebsocketConsumer::new(
        WebsocketDialer::new(format!("ws://{addr}/ws"), Some(token.to_string())),
        Arc::new(ClientHandlerRouter::new()),
        Duration::from_secs(5),
    )
}

fn forward(app: &str, body: &str) -> Message {
    ForwardRequestMessage::new(
        app,
        MessageKind::ForwardRequest,
        ForwardRequest {
            body: RawPayload::from_json(body).unwrap(),
        },
        Duration::from_secs(5),
    )
    .marshal()
    .unwrap()
}

async fn dispatch(addr: SocketAddr, message: &Message) -> Response {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/dispatch"))
        .body(message.to_json().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    Response::from_slice(&resp.bytes().await.unwrap()).unwrap()
}

#[tokio::test]
async fn request_tunnels_through_client_socket() {
    let (state, addr) = start_server().await;

    let before = dispatch(addr, &forward("app", "1")).await;
    assert_eq!(before.error.unwrap().code, ErrorCode::NoActiveConsumer);

    let consumer = consumer(addr, TOKEN);
    consumer.connect().await.unwrap();
    let cancel = CancellationToken::new();
    let loop_task = tokio::spawn({
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        async move { consumer.consume(cancel).await }
    });

    consumer
        .subscribe(
            "app",
            function_handler(|body: Vec<u8>| async move {
                let n: u64 = serde_json::from_slice(&body).unwrap();
                Ok(serde_json::to_vec(&(n * 2)).unwrap())
            }),
        )
        .await
        .unwrap();
    let server = state.websocket_server().unwrap();
    assert!(server.registry().contains("app"));

    let message = forward("app", "21");
    let resp = dispatch(addr, &message).await;
    assert_eq!(resp.id, message.id);
    let typed = resp.unmarshal::<ForwardRequestResponse>().unwrap();
    assert_eq!(typed.data.unwrap().body.as_str(), "42");

    // Concurrent requests share the socket.
    let mut calls = Vec::new();
    for n in 0..8u64 {
        calls.push(tokio::spawn(async move {
            let resp = dispatch(addr, &forward("app", &n.to_string())).await;
            let typed = resp.unmarshal::<ForwardRequestResponse>().unwrap();
            (n, typed.data.unwrap().body.as_str().to_string())
        }));
    }
    for call in calls {
        let (n, body) = call.await.unwrap();
        assert_eq!(body, (n * 2).to_string());
    }

    consumer.unsubscribe("app").await.unwrap();
    assert!(!server.registry().contains("app"));

    cancel.cancel();
    assert!(matches!(loop_task.await.unwrap(), Err(FuncieError::Cancelled)));
}

#[tokio::test]
async fn closed_socket_releases_applications() {
    let (state, addr) = start_server().await;
    let consumer = consumer(addr, TOKEN);
    consumer.connect().await.unwrap();
    consumer
        .subscribe("app", function_handler(|body: Vec<u8>| async move { Ok(body) }))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let loop_task = tokio::spawn({
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        async move { consumer.consume(cancel).await }
    });
    cancel.cancel();
    loop_task.await.unwrap().unwrap_err();

    let registry = Arc::clone(state.websocket_server().unwrap().registry());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while registry.contains("app") {
        assert!(tokio::time::Instant::now() < deadline, "registration was not released");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn bad_token_is_rejected() {
    let (_state, addr) = start_server().await;
    let consumer = consumer(addr, "wrong");
    assert!(consumer.connect().await.is_err());
}

#[tokio::test]
async fn plain_get_needs_upgrade() {
    let (_state, addr) = start_server().await;
    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/ws"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 426);
}
