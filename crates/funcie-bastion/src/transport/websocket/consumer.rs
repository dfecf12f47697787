//! Consumer side of the websocket transport: a client bastion holding one
//! socket to a server bastion and registering its applications over it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use funcie_core::protocol::payloads::{
    DeregistrationMessage, DeregistrationRequest, RegistrationMessage, RegistrationRequest,
};
use funcie_core::{FuncieError, Message, MessageKind, Result, ResultExt};

use super::connection::Connection;
use super::dialer::WebsocketDialer;
use super::exchange::{send, serve_connection};
use super::processor::ConsumerProcessor;
use crate::dispatch::{ClientHandler, ClientHandlerRouter};
use crate::transport::{Consumer, ResponseNotifier};

#[derive(Clone)]
pub struct WebsocketConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    dialer: WebsocketDialer,
    router: Arc<ClientHandlerRouter>,
    notifier: Arc<ResponseNotifier>,
    request_ttl: Duration,
    conn: Mutex<Option<Arc<dyn Connection>>>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl WebsocketConsumer {
    pub fn new(dialer: WebsocketDialer, router: Arc<ClientHandlerRouter>, request_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer,
                router,
                notifier: Arc::new(ResponseNotifier::new()),
                request_ttl,
                conn: Mutex::new(None),
                reader: AsyncMutex::new(None),
            }),
        }
    }

    fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.inner
            .conn
            .lock()
            .clone()
            .ok_or_else(|| FuncieError::Transport("consumer is not connected".into()))
    }

    async fn exchange(&self, message: Message) -> Result<()> {
        let conn = self.connection()?;
        send(conn.as_ref(), &self.inner.notifier, &message)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn register_remote(&self, application: &str) -> Result<()> {
        let message = RegistrationMessage::new(
            application,
            MessageKind::Register,
            RegistrationRequest {
                name: application.to_string(),
                endpoint: None,
            },
            self.inner.request_ttl,
        )
        .marshal()?;
        self.exchange(message)
            .await
            .with_context(|| format!("register {application} with server bastion"))
    }

    async fn deregister_remote(&self, application: &str) -> Result<()> {
        let message = DeregistrationMessage::new(
            application,
            MessageKind::Deregister,
            DeregistrationRequest {
                name: application.to_string(),
            },
            self.inner.request_ttl,
        )
        .marshal()?;
        self.exchange(message)
            .await
            .with_context(|| format!("deregister {application} with server bastion"))
    }
}

#[async_trait]
impl Consumer for WebsocketConsumer {
    async fn connect(&self) -> Result<()> {
        let (conn, frames) = self.inner.dialer.dial().await?;
        let reader = serve_connection(
            Arc::clone(&conn),
            frames,
            Arc::new(ConsumerProcessor::new(Arc::clone(&self.inner.router))),
            Arc::clone(&self.inner.notifier),
        );
        *self.inner.conn.lock() = Some(conn);
        *self.inner.reader.lock().await = Some(reader);

        // Applications subscribed on a previous socket.
        for application in self.inner.router.applications() {
            self.register_remote(&application).await?;
        }
        Ok(())
    }

    async fn consume(&self, cancel: CancellationToken) -> Result<()> {
        let reader = self
            .inner
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| FuncieError::Transport("consumer is not connected".into()))?;

        tokio::select! {
            _ = cancel.cancelled() => {
                if let Ok(conn) = self.connection() {
                    conn.close("consumer shutting down").await;
                }
                Err(FuncieError::Cancelled)
            }
            _ = reader => {
                tracing::warn!(url = %self.inner.dialer.url(), "connection to server bastion closed");
                Err(FuncieError::Transport("connection to server bastion closed".into()))
            }
        }
    }

    async fn subscribe(&self, application: &str, handler: Arc<dyn ClientHandler>) -> Result<()> {
        self.connection()?;
        self.inner.router.add_client_handler(application, handler)?;
        if let Err(e) = self.register_remote(application).await {
            let _ = self.inner.router.remove_client_handler(application);
            return Err(e);
        }
        tracing::info!(application = %application, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, application: &str) -> Result<()> {
        self.inner.router.remove_client_handler(application)?;
        self.deregister_remote(application).await?;
        tracing::info!(application = %application, "unsubscribed");
        Ok(())
    }
}
