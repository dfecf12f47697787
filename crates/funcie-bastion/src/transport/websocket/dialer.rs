use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use funcie_core::{FuncieError, Result};

use super::connection::{frames, Connection, FrameStream, SinkConnection};
use super::SUBPROTOCOL;

/// Opens client sockets to a server bastion.
#[derive(Debug, Clone)]
pub struct WebsocketDialer {
    url: String,
    auth_token: Option<String>,
}

impl WebsocketDialer {
    pub fn new(url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            auth_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn dial(&self) -> Result<(Arc<dyn Connection>, FrameStream)> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FuncieError::Config(format!("invalid server url {}: {e}", self.url)))?;
        let headers = request.headers_mut();
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FuncieError::Config(format!("invalid auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| FuncieError::Transport(format!("dial {}: {e}", self.url)))?;
        let (sink, read) = stream.split();
        let conn: Arc<dyn Connection> = SinkConnection::<_, TungsteniteMessage>::new(sink);
        tracing::info!(url = %self.url, connection = %conn.id(), "connected to server bastion");
        Ok((conn, frames(read)))
    }
}
