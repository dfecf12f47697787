//! Server-side socket accept: bearer check, upgrade, read loop.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use super::connection::{frames, Connection, SinkConnection};
use super::exchange::serve_connection;
use super::processor::ServerConnectionHandler;
use super::registry::ConnectionRegistry;
use super::SUBPROTOCOL;
use crate::app_state::AppState;
use crate::dispatch::{Dispatcher, NoConsumerCache};
use crate::transport::ResponseNotifier;

/// Socket-facing half of a server bastion.
pub struct WebsocketServer {
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<ResponseNotifier>,
    no_consumer: Arc<NoConsumerCache>,
    auth_token: Option<String>,
}

impl WebsocketServer {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<ResponseNotifier>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            registry,
            notifier,
            no_consumer: Arc::new(NoConsumerCache::new()),
            auth_token,
        }
    }

    /// Share `cache` with the server's processor. Registrations arriving
    /// on a socket clear the application's entry.
    pub fn with_no_consumer_cache(mut self, cache: Arc<NoConsumerCache>) -> Self {
        self.no_consumer = cache;
        self
    }

    pub fn no_consumer_cache(&self) -> &Arc<NoConsumerCache> {
        &self.no_consumer
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// True when the request may upgrade.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.auth_token.as_deref() else {
            return true;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
    }

    /// Run one accepted socket until it closes.
    pub async fn serve(self: Arc<Self>, socket: WebSocket) {
        let (sink, stream) = socket.split();
        let conn: Arc<dyn Connection> = SinkConnection::<_, WsMessage>::new(sink);
        let handler = ServerConnectionHandler::new(
            Arc::clone(&conn),
            Arc::clone(&self.registry),
            Arc::clone(&self.no_consumer),
        );
        tracing::info!(connection = %conn.id(), "consumer connected");

        let reader = serve_connection(
            Arc::clone(&conn),
            frames(stream),
            Arc::new(Dispatcher::new(handler)),
            Arc::clone(&self.notifier),
        );
        if let Err(e) = reader.await {
            tracing::warn!(connection = %conn.id(), error = %e, "read loop aborted");
        }

        let released = self.registry.unregister_socket(conn.id()).await;
        conn.close("connection closed").await;
        tracing::info!(connection = %conn.id(), applications = ?released, "consumer disconnected");
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `GET /ws`
pub async fn ws_upgrade(
    State(app): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(server) = app.websocket_server() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !server.authorize(&headers) {
        tracing::warn!("rejected websocket connection with bad credentials");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let Some(ws) = ws else {
        return (StatusCode::UPGRADE_REQUIRED, "websocket upgrade required").into_response();
    };
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| server.serve(socket))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn server(token: Option<&str>) -> WebsocketServer {
        WebsocketServer::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(ResponseNotifier::new()),
            token.map(str::to_string),
        )
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap_or(HeaderValue::from_static("")));
        headers
    }

    #[test]
    fn bearer_token_checked() {
        let s = server(Some("secret"));
        assert!(s.authorize(&bearer("Bearer secret")));
        assert!(!s.authorize(&bearer("Bearer secreT")));
        assert!(!s.authorize(&bearer("secret")));
        assert!(!s.authorize(&HeaderMap::new()));
        assert!(server(None).authorize(&HeaderMap::new()));
    }

    #[test]
    fn constant_time_eq_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
