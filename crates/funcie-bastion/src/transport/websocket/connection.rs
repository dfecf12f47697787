//! Socket connections.
//!
//! The server side (axum) and the client side (tungstenite) use different
//! frame types; [`WireFrame`] hides that so both sides share one
//! [`SinkConnection`] and one read loop.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use funcie_core::{FuncieError, Result};

use super::envelope::Envelope;

/// One physical socket.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Unique per socket.
    fn id(&self) -> &str;

    async fn write(&self, envelope: &Envelope) -> Result<()>;

    /// Send a close frame with `reason` and stop accepting writes.
    async fn close(&self, reason: &str);

    fn is_closed(&self) -> bool;
}

/// What the read loop cares about in an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    /// Ping, pong, binary: ignored.
    Other,
}

pub type FrameStream = BoxStream<'static, Result<Frame>>;

pub trait WireFrame: Send + 'static {
    fn text(text: String) -> Self;
    fn close(reason: &str) -> Self;
    fn into_frame(self) -> Frame;
}

impl WireFrame for axum::extract::ws::Message {
    fn text(text: String) -> Self {
        axum::extract::ws::Message::Text(text)
    }

    fn close(reason: &str) -> Self {
        axum::extract::ws::Message::Close(Some(axum::extract::ws::CloseFrame {
            code: axum::extract::ws::close_code::NORMAL,
            reason: reason.to_string().into(),
        }))
    }

    fn into_frame(self) -> Frame {
        match self {
            axum::extract::ws::Message::Text(text) => Frame::Text(text),
            axum::extract::ws::Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        }
    }
}

impl WireFrame for tokio_tungstenite::tungstenite::Message {
    fn text(text: String) -> Self {
        tokio_tungstenite::tungstenite::Message::text(text)
    }

    fn close(reason: &str) -> Self {
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        tokio_tungstenite::tungstenite::Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        }))
    }

    fn into_frame(self) -> Frame {
        match self {
            tokio_tungstenite::tungstenite::Message::Text(text) => Frame::Text(text.as_str().to_string()),
            tokio_tungstenite::tungstenite::Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        }
    }
}

/// Adapt the read half of a socket into a [`FrameStream`].
pub fn frames<St, M, E>(stream: St) -> FrameStream
where
    St: Stream<Item = std::result::Result<M, E>> + Send + 'static,
    M: WireFrame,
    E: Display,
{
    stream
        .map(|item| {
            item.map(M::into_frame)
                .map_err(|e| FuncieError::Transport(format!("read frame: {e}")))
        })
        .boxed()
}

/// Write half of a socket behind a mutex, so concurrent writers never
/// interleave frames.
pub struct SinkConnection<S, M> {
    id: String,
    sink: Mutex<S>,
    closed: AtomicBool,
    _frame: PhantomData<fn(M)>,
}

impl<S, M> SinkConnection<S, M>
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: Display,
    M: WireFrame,
{
    pub fn new(sink: S) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            _frame: PhantomData,
        })
    }
}

#[async_trait]
impl<S, M> Connection for SinkConnection<S, M>
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: Display,
    M: WireFrame,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&self, envelope: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(FuncieError::Transport(format!("connection {} is closed", self.id)));
        }
        let text = envelope.to_json()?;
        let mut sink = self.sink.lock().await;
        sink.send(M::text(text))
            .await
            .map_err(|e| FuncieError::Transport(format!("write to connection {}: {e}", self.id)))
    }

    async fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(connection = %self.id, reason = %reason, "closing connection");
        let mut sink = self.sink.lock().await;
        let _ = sink.send(M::close(reason)).await;
        let _ = sink.close().await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One application's view of a socket that may carry several applications.
pub struct ApplicationConnection {
    application: String,
    socket: Arc<dyn Connection>,
    detached: AtomicBool,
}

impl ApplicationConnection {
    pub fn new(application: impl Into<String>, socket: Arc<dyn Connection>) -> Self {
        Self {
            application: application.into(),
            socket,
            detached: AtomicBool::new(false),
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn socket(&self) -> &Arc<dyn Connection> {
        &self.socket
    }

    pub fn socket_id(&self) -> &str {
        self.socket.id()
    }

    pub async fn write(&self, envelope: &Envelope) -> Result<()> {
        if self.detached.load(Ordering::Acquire) {
            return Err(FuncieError::NoActiveConsumer);
        }
        self.socket.write(envelope).await
    }

    /// Stop routing through this view without closing the socket.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire) || self.socket.is_closed()
    }
}
