//! Message handling for each end of a socket.
//!
//! - [`ServerConnectionHandler`]: server side. Registrations arriving on a
//!   socket bind the application to that socket.
//! - [`ConsumerProcessor`]: client side. Forwarded requests go to the
//!   application's handler.

use std::sync::Arc;

use async_trait::async_trait;

use funcie_core::protocol::payloads::{
    DeregistrationMessage, DeregistrationResponse, DeregistrationResult, ForwardRequestMessage,
    ForwardRequestResult, RegistrationMessage, RegistrationResponse, RegistrationResult,
};
use funcie_core::{ErrorCode, FuncieError, Message, ProxyError, Response, Result};

use super::connection::{ApplicationConnection, Connection};
use super::registry::ConnectionRegistry;
use crate::dispatch::{ClientHandlerRouter, MessageHandler, MessageProcessor, NoConsumerCache};

pub struct ServerConnectionHandler {
    socket: Arc<dyn Connection>,
    registry: Arc<ConnectionRegistry>,
    no_consumer: Arc<NoConsumerCache>,
}

impl ServerConnectionHandler {
    pub fn new(
        socket: Arc<dyn Connection>,
        registry: Arc<ConnectionRegistry>,
        no_consumer: Arc<NoConsumerCache>,
    ) -> Self {
        Self {
            socket,
            registry,
            no_consumer,
        }
    }
}

#[async_trait]
impl MessageHandler for ServerConnectionHandler {
    async fn register(&self, message: RegistrationMessage) -> Result<RegistrationResult> {
        let name = message.payload.name;
        self.registry
            .register(ApplicationConnection::new(name.clone(), Arc::clone(&self.socket)))
            .await;
        self.no_consumer.forget(&name);
        tracing::info!(application = %name, connection = %self.socket.id(), "application attached");
        Ok(RegistrationResult::success(message.id, RegistrationResponse::generate()))
    }

    async fn deregister(&self, message: DeregistrationMessage) -> Result<DeregistrationResult> {
        let name = message.payload.name;
        // Only the socket an application is bound to may detach it.
        let detached = self
            .registry
            .unregister_on_socket(&name, self.socket.id())
            .await;
        if detached.is_none() {
            return Err(FuncieError::ApplicationNotFound(name));
        }
        tracing::info!(application = %name, connection = %self.socket.id(), "application detached");
        Ok(DeregistrationResult::success(message.id, DeregistrationResponse {}))
    }

    async fn forward_request(&self, _message: ForwardRequestMessage) -> Result<ForwardRequestResult> {
        Err(FuncieError::Unsupported("forward request from a consumer".into()))
    }
}

/// Routes forwarded requests to the consumer's handlers.
pub struct ConsumerProcessor {
    router: Arc<ClientHandlerRouter>,
}

impl ConsumerProcessor {
    pub fn new(router: Arc<ClientHandlerRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl MessageProcessor for ConsumerProcessor {
    async fn process_message(&self, message: Message) -> Result<Response> {
        let id = message.id.clone();
        match self.router.handle(message).await {
            Err(err) if matches!(err.root(), FuncieError::NoHandlerFound(_)) => {
                tracing::debug!(message_id = %id, error = %err, "no handler on this consumer");
                Ok(Response::failure(
                    id,
                    ProxyError::new(ErrorCode::NoActiveConsumer, err.to_string()),
                ))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use funcie_core::protocol::payloads::{DeregistrationRequest, RegistrationRequest};
    use funcie_core::MessageKind;

    use super::*;
    use crate::transport::websocket::envelope::Envelope;

    struct Socket(&'static str);

    #[async_trait]
    impl Connection for Socket {
        fn id(&self) -> &str {
            self.0
        }

        async fn write(&self, _envelope: &Envelope) -> Result<()> {
            Ok(())
        }

        async fn close(&self, _reason: &str) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn handler(
        socket: &'static str,
        registry: &Arc<ConnectionRegistry>,
        cache: &Arc<NoConsumerCache>,
    ) -> ServerConnectionHandler {
        ServerConnectionHandler::new(Arc::new(Socket(socket)), Arc::clone(registry), Arc::clone(cache))
    }

    fn register(app: &str) -> RegistrationMessage {
        RegistrationMessage::new(
            app,
            MessageKind::Register,
            RegistrationRequest {
                name: app.to_string(),
                endpoint: None,
            },
            Duration::from_secs(1),
        )
    }

    fn deregister(app: &str) -> DeregistrationMessage {
        DeregistrationMessage::new(
            app,
            MessageKind::Deregister,
            DeregistrationRequest { name: app.to_string() },
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn registration_clears_cached_absence() {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(NoConsumerCache::new());
        cache.record("app");

        let resp = handler("s1", &registry, &cache).register(register("app")).await.unwrap();
        assert!(resp.data.is_some());
        assert!(registry.contains("app"));
        assert!(!cache.is_absent("app"));
    }

    #[tokio::test]
    async fn deregister_from_another_socket_is_not_found() {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(NoConsumerCache::new());
        let owner = handler("s1", &registry, &cache);
        let stranger = handler("s2", &registry, &cache);

        owner.register(register("app")).await.unwrap();
        let err = stranger.deregister(deregister("app")).await.unwrap_err();
        assert!(matches!(err, FuncieError::ApplicationNotFound(_)));
        assert!(registry.contains("app"));

        owner.deregister(deregister("app")).await.unwrap();
        assert!(!registry.contains("app"));
    }
}
