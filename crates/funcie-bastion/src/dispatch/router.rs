//! Client handler router: one handler per application on a consumer.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use funcie_core::protocol::payloads::{ForwardRequest, ForwardRequestResponse, ForwardRequestResult};
use funcie_core::{FuncieError, Message, MessageKind, ProxyError, RawPayload, Response, Result};

/// Application code reachable through a consumer.
#[async_trait]
pub trait ClientHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<Response>;
}

/// Adapts an async closure over whole messages.
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> ClientHandler for FnHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn handle(&self, message: Message) -> Result<Response> {
        (self.f)(message).await
    }
}

/// Wrap a function over opaque invocation bytes as a forward-request handler.
///
/// The function receives the forward request body and its output becomes
/// the response body. A function error is returned to the publisher as a
/// proxied error on the response, not as a transport failure.
pub fn function_handler<F, Fut>(f: F) -> Arc<dyn ClientHandler>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(FnHandler::new(move |message: Message| {
        let f = Arc::clone(&f);
        async move {
            if message.kind != MessageKind::ForwardRequest {
                return Err(FuncieError::UnknownMessageKind(message.kind.to_string()));
            }
            let request = message.unmarshal::<ForwardRequest>()?;
            let result = match f(request.payload.body.to_vec()).await {
                Ok(output) => {
                    let body = RawPayload::from_slice(&output)
                        .map_err(|e| e.wrap(format!("function output for message {}", message.id)))?;
                    ForwardRequestResult::success(message.id, ForwardRequestResponse { body })
                }
                Err(err) => ForwardRequestResult::failure(message.id, ProxyError::from_error(&err)),
            };
            result.marshal()
        }
    }))
}

/// Routes inbound messages to the handler registered for their application.
#[derive(Default)]
pub struct ClientHandlerRouter {
    handlers: DashMap<String, Arc<dyn ClientHandler>>,
}

impl ClientHandlerRouter {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn add_client_handler(&self, application: &str, handler: Arc<dyn ClientHandler>) -> Result<()> {
        match self.handlers.entry(application.to_string()) {
            Entry::Occupied(_) => Err(FuncieError::HandlerAlreadyRegistered(application.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    pub fn remove_client_handler(&self, application: &str) -> Result<()> {
        self.handlers
            .remove(application)
            .map(|_| ())
            .ok_or_else(|| FuncieError::NoHandlerFound(application.to_string()))
    }

    pub fn contains(&self, application: &str) -> bool {
        self.handlers.contains_key(application)
    }

    pub fn applications(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    /// Invoke the application's handler and return its result verbatim.
    pub async fn handle(&self, message: Message) -> Result<Response> {
        let handler = self
            .handlers
            .get(&message.application)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| FuncieError::NoHandlerFound(message.application.clone()))?;
        handler.handle(message).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use funcie_core::ErrorCode;

    use super::*;

    fn echo() -> Arc<dyn ClientHandler> {
        function_handler(|body: Vec<u8>| async move { Ok(body) })
    }

    fn forward(app: &str, body: &str) -> Message {
        let typed = funcie_core::MessageBase::new(
            app,
            MessageKind::ForwardRequest,
            ForwardRequest {
                body: RawPayload::from_json(body).unwrap(),
            },
            Duration::from_secs(1),
        );
        typed.marshal().unwrap()
    }

    #[tokio::test]
    async fn routes_by_application() {
        let router = ClientHandlerRouter::new();
        router.add_client_handler("a", echo()).unwrap();

        let msg = forward("a", r#""hello""#);
        let resp = router.handle(msg.clone()).await.unwrap();
        assert_eq!(resp.id, msg.id);
        let typed = resp.unmarshal::<ForwardRequestResponse>().unwrap();
        assert_eq!(typed.data.unwrap().body.as_str(), r#""hello""#);
    }

    #[tokio::test]
    async fn duplicate_and_missing_handlers_are_errors() {
        let router = ClientHandlerRouter::new();
        router.add_client_handler("a", echo()).unwrap();
        assert!(matches!(
            router.add_client_handler("a", echo()),
            Err(FuncieError::HandlerAlreadyRegistered(_))
        ));

        router.remove_client_handler("a").unwrap();
        assert!(matches!(
            router.remove_client_handler("a"),
            Err(FuncieError::NoHandlerFound(_))
        ));
        assert!(matches!(
            router.handle(forward("a", "1")).await,
            Err(FuncieError::NoHandlerFound(_))
        ));
    }

    #[tokio::test]
    async fn function_errors_become_proxied() {
        let router = ClientHandlerRouter::new();
        router
            .add_client_handler(
                "a",
                function_handler(|_body: Vec<u8>| async move {
                    Err::<Vec<u8>, _>(FuncieError::Internal("lambda failed".into()))
                }),
            )
            .unwrap();

        let resp = router.handle(forward("a", "{}")).await.unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, "internal: lambda failed");
    }
}
