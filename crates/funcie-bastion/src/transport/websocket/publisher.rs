use std::sync::Arc;

use async_trait::async_trait;

use funcie_core::{FuncieError, Message, Response, Result};

use super::envelope::Envelope;
use super::registry::ConnectionRegistry;
use crate::transport::{Publisher, ResponseNotifier};

/// Publishes to whichever socket the application registered on.
pub struct WebsocketPublisher {
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<ResponseNotifier>,
}

impl WebsocketPublisher {
    pub fn new(registry: Arc<ConnectionRegistry>, notifier: Arc<ResponseNotifier>) -> Self {
        Self { registry, notifier }
    }
}

#[async_trait]
impl Publisher for WebsocketPublisher {
    async fn publish(&self, message: Message) -> Result<Response> {
        let application = message.application.as_str();
        let envelope = Envelope::request(&message)?;

        let Some(conn) = self.registry.acquire_exclusive(application).await else {
            tracing::debug!(application = %application, message_id = %message.id, "no connection registered");
            return Err(FuncieError::NoActiveConsumer);
        };
        let written = conn.write(&envelope).await;
        self.registry.release_exclusive(application, conn);
        if let Err(e) = written {
            tracing::warn!(application = %application, message_id = %message.id, error = %e, "write failed");
            return Err(FuncieError::NoActiveConsumer.wrap(e.to_string()));
        }

        self.notifier.wait_for_response(&message.id, message.ttl).await
    }
}
