//! Consumer side of the Redis transport.
//!
//! One pub/sub session carries a channel per subscribed application. Each
//! inbound message is processed on its own task so a slow or failing
//! handler never stalls the loop.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use funcie_core::{FuncieError, Message, ProxyError, Response, Result, ResultExt};

use super::client::{PubSubMessage, PubSubSession, RedisClient};
use super::keys::{application_from_channel, channel_for_application, response_key};
use crate::dispatch::{ClientHandler, ClientHandlerRouter};
use crate::transport::store::{ConnectionStore, SharedConnection};
use crate::transport::Consumer;

type Session = Arc<SharedConnection<Arc<dyn PubSubSession>>>;

#[derive(Clone)]
pub struct RedisConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn RedisClient>,
    base_channel: String,
    router: Arc<ClientHandlerRouter>,
    store: ConnectionStore<Arc<dyn PubSubSession>>,
    session: Mutex<Option<Session>>,
    inbox: AsyncMutex<Option<mpsc::UnboundedReceiver<PubSubMessage>>>,
}

impl RedisConsumer {
    pub fn new(
        client: Arc<dyn RedisClient>,
        base_channel: impl Into<String>,
        router: Arc<ClientHandlerRouter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                base_channel: base_channel.into(),
                router,
                store: ConnectionStore::new(),
                session: Mutex::new(None),
                inbox: AsyncMutex::new(None),
            }),
        }
    }

    pub fn router(&self) -> &Arc<ClientHandlerRouter> {
        &self.inner.router
    }

    fn session(&self) -> Result<Session> {
        self.inner
            .session
            .lock()
            .clone()
            .ok_or_else(|| FuncieError::Transport("consumer is not connected".into()))
    }

    /// Stop listening on the application's channel.
    async fn drop_subscription(&self, application: &str) -> Result<()> {
        let Some(session) = self.inner.store.get_connection(application) else {
            return Ok(());
        };
        let channel = channel_for_application(&self.inner.base_channel, application);
        session
            .connection()
            .unsubscribe(&channel)
            .await
            .with_context(|| format!("unsubscribe {channel}"))?;
        if self.inner.store.unregister_connection(application).is_some() {
            tracing::debug!("pubsub session has no applications left");
        }
        Ok(())
    }

    async fn process(self, raw: PubSubMessage) {
        let message = match Message::from_slice(raw.payload.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(channel = %raw.channel, error = %e, "dropping malformed message");
                return;
            }
        };
        if message.id.is_empty() {
            tracing::warn!(channel = %raw.channel, "dropping message without id");
            return;
        }

        let id = message.id.clone();
        let application = message.application.clone();
        let resp = match self.inner.router.handle(message).await {
            Ok(resp) => resp,
            Err(err) if matches!(err.root(), FuncieError::NoHandlerFound(_)) => {
                tracing::warn!(application = %application, message_id = %id, error = %err, "no handler, unsubscribing");
                if let Some(app) = application_from_channel(&self.inner.base_channel, &raw.channel) {
                    if let Err(e) = self.drop_subscription(app).await {
                        tracing::warn!(application = %app, error = %e, "cleanup failed");
                    }
                }
                return;
            }
            Err(err) => {
                tracing::warn!(application = %application, message_id = %id, error = %err, "handler failed");
                Response::failure(id.clone(), ProxyError::from_error(&err))
            }
        };

        let key = response_key(&self.inner.base_channel, &id);
        let pushed = match resp.to_json() {
            Ok(json) => self.inner.client.rpush(&key, &json).await,
            Err(e) => Err(e),
        };
        match pushed {
            Ok(()) => tracing::debug!(application = %application, message_id = %id, "response pushed"),
            Err(e) => tracing::warn!(application = %application, message_id = %id, error = %e, "failed to push response"),
        }
    }
}

#[async_trait]
impl Consumer for RedisConsumer {
    async fn connect(&self) -> Result<()> {
        let (session, inbox) = self.inner.client.open_pubsub().await.context("open pubsub")?;
        session
            .subscribe(&self.inner.base_channel)
            .await
            .with_context(|| format!("subscribe {}", self.inner.base_channel))?;

        *self.inner.session.lock() = Some(SharedConnection::new(session));
        *self.inner.inbox.lock().await = Some(inbox);
        tracing::info!(channel = %self.inner.base_channel, "redis consumer connected");
        Ok(())
    }

    async fn consume(&self, cancel: CancellationToken) -> Result<()> {
        let mut inbox = self
            .inner
            .inbox
            .lock()
            .await
            .take()
            .ok_or_else(|| FuncieError::Transport("consumer is not connected".into()))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!("redis consumer cancelled");
                    return Err(FuncieError::Cancelled);
                }
                next = inbox.recv() => {
                    let Some(raw) = next else {
                        tracing::debug!("pubsub channel closed");
                        return Err(FuncieError::PubSubChannelClosed);
                    };
                    if raw.channel == self.inner.base_channel {
                        continue;
                    }
                    tokio::spawn(self.clone().process(raw));
                }
            }
        }
    }

    async fn subscribe(&self, application: &str, handler: Arc<dyn ClientHandler>) -> Result<()> {
        let session = self.session()?;
        self.inner.router.add_client_handler(application, handler)?;

        let channel = channel_for_application(&self.inner.base_channel, application);
        if let Err(e) = session.connection().subscribe(&channel).await {
            let _ = self.inner.router.remove_client_handler(application);
            return Err(e.wrap(format!("subscribe {channel}")));
        }
        self.inner.store.register_connection(application, &session);
        tracing::info!(application = %application, channel = %channel, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, application: &str) -> Result<()> {
        let removed = self.inner.router.remove_client_handler(application);
        self.drop_subscription(application).await?;
        tracing::info!(application = %application, "unsubscribed");
        removed
    }
}
