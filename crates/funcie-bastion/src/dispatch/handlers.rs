//! The two sides of a bastion, as [`MessageHandler`]s.
//!
//! - [`PublisherHandler`]: server bastion. Forwards requests to whichever
//!   consumer is attached through a [`Publisher`].
//! - [`RegistryHandler`]: client bastion. Tracks local applications, keeps
//!   the consumer subscribed for them, and forwards requests over HTTP.

use std::sync::Arc;

use async_trait::async_trait;

use funcie_core::protocol::payloads::{
    DeregistrationMessage, DeregistrationResponse, DeregistrationResult, ForwardRequestMessage,
    ForwardRequestResponse, ForwardRequestResult, RegistrationMessage, RegistrationResponse,
    RegistrationResult,
};
use funcie_core::{Application, FuncieError, Message, Response, Result, ResultExt};

use super::app_client::ApplicationClient;
use super::processor::MessageHandler;
use super::router::ClientHandler;
use crate::registry::ApplicationRegistry;
use crate::transport::{Consumer, Publisher};

pub struct PublisherHandler {
    publisher: Arc<dyn Publisher>,
}

impl PublisherHandler {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl MessageHandler for PublisherHandler {
    async fn register(&self, _message: RegistrationMessage) -> Result<RegistrationResult> {
        Err(FuncieError::Unsupported("register on a server bastion".into()))
    }

    async fn deregister(&self, _message: DeregistrationMessage) -> Result<DeregistrationResult> {
        Err(FuncieError::Unsupported("deregister on a server bastion".into()))
    }

    async fn forward_request(&self, message: ForwardRequestMessage) -> Result<ForwardRequestResult> {
        tracing::debug!(application = %message.application, message_id = %message.id, "forwarding request");
        let marshaled = message.marshal()?;
        let resp = self.publisher.publish(marshaled).await.context("publish request")?;
        resp.unmarshal::<ForwardRequestResponse>()
            .context("unmarshal forwarded response")
    }
}

/// Resolves the target application and delivers the message to it.
pub struct ApplicationForwarder {
    registry: Arc<dyn ApplicationRegistry>,
    client: Arc<dyn ApplicationClient>,
}

impl ApplicationForwarder {
    pub fn new(registry: Arc<dyn ApplicationRegistry>, client: Arc<dyn ApplicationClient>) -> Self {
        Self { registry, client }
    }
}

#[async_trait]
impl ClientHandler for ApplicationForwarder {
    async fn handle(&self, message: Message) -> Result<Response> {
        let app = self
            .registry
            .get_application(&message.application)
            .await
            .with_context(|| format!("get application {}", message.application))?;
        self.client.process_request(&app, &message).await
    }
}

pub struct RegistryHandler {
    registry: Arc<dyn ApplicationRegistry>,
    consumer: Arc<dyn Consumer>,
    forwarder: Arc<ApplicationForwarder>,
}

impl RegistryHandler {
    pub fn new(
        registry: Arc<dyn ApplicationRegistry>,
        consumer: Arc<dyn Consumer>,
        client: Arc<dyn ApplicationClient>,
    ) -> Self {
        let forwarder = Arc::new(ApplicationForwarder::new(Arc::clone(&registry), client));
        Self {
            registry,
            consumer,
            forwarder,
        }
    }
}

#[async_trait]
impl MessageHandler for RegistryHandler {
    async fn register(&self, message: RegistrationMessage) -> Result<RegistrationResult> {
        let request = message.payload;
        let endpoint = request.endpoint.ok_or_else(|| {
            FuncieError::Unsupported(format!("registration of {} without an endpoint", request.name))
        })?;
        self.registry
            .register(Application::new(request.name.clone(), endpoint))
            .await?;

        // Re-registration keeps the existing subscription; the forwarder
        // resolves the endpoint on every request.
        match self.consumer.subscribe(&request.name, self.forwarder.clone()).await {
            Ok(()) => {}
            Err(err) if matches!(err.root(), FuncieError::HandlerAlreadyRegistered(_)) => {}
            Err(err) => return Err(err.wrap(format!("subscribe {}", request.name))),
        }

        tracing::info!(application = %request.name, "application registered");
        Ok(RegistrationResult::success(message.id, RegistrationResponse::generate()))
    }

    async fn deregister(&self, message: DeregistrationMessage) -> Result<DeregistrationResult> {
        let name = &message.payload.name;
        self.registry.unregister(name).await?;
        match self.consumer.unsubscribe(name).await {
            Ok(()) => {}
            Err(err) if matches!(err.root(), FuncieError::NoHandlerFound(_)) => {}
            Err(err) => return Err(err.wrap(format!("unsubscribe {name}"))),
        }

        tracing::info!(application = %name, "application deregistered");
        Ok(DeregistrationResult::success(message.id, DeregistrationResponse {}))
    }

    async fn forward_request(&self, message: ForwardRequestMessage) -> Result<ForwardRequestResult> {
        let resp = self.forwarder.handle(message.marshal()?).await?;
        resp.unmarshal::<ForwardRequestResponse>()
            .context("unmarshal application response")
    }
}
