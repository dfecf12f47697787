//! Message processing: dispatch by message kind to a [`MessageHandler`].

use async_trait::async_trait;

use funcie_core::protocol::payloads::{
    DeregistrationMessage, DeregistrationRequest, DeregistrationResult, ForwardRequest,
    ForwardRequestMessage, ForwardRequestResult, RegistrationMessage, RegistrationRequest,
    RegistrationResult,
};
use funcie_core::{
    ErrorCode, FuncieError, Message, MessageKind, ProxyError, Response, Result, ResultExt,
};

/// Typed operations behind each message kind.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn register(&self, message: RegistrationMessage) -> Result<RegistrationResult>;
    async fn deregister(&self, message: DeregistrationMessage) -> Result<DeregistrationResult>;
    async fn forward_request(&self, message: ForwardRequestMessage) -> Result<ForwardRequestResult>;
}

/// Turns one message into exactly one response.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process_message(&self, message: Message) -> Result<Response>;
}

/// Dispatch table from message kind to handler operation.
pub struct Dispatcher<H> {
    handler: H,
}

impl<H: MessageHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    async fn forward_request(&self, message: Message) -> Result<Response> {
        let typed = message
            .unmarshal::<ForwardRequest>()
            .context("unmarshal forward request payload")?;
        match self.handler.forward_request(typed).await {
            Ok(resp) => resp.marshal(),
            Err(err) if err.is_no_consumer() => {
                tracing::debug!(
                    application = %message.application,
                    message_id = %message.id,
                    error = %err,
                    "no consumer for forwarded request"
                );
                Ok(Response::failure(
                    message.id,
                    ProxyError::new(
                        ErrorCode::NoActiveConsumer,
                        FuncieError::NoActiveConsumer.to_string(),
                    ),
                ))
            }
            Err(err) => Err(err.wrap(format!("forward request {}", message.id))),
        }
    }

    async fn register(&self, message: Message) -> Result<Response> {
        let typed = message
            .unmarshal::<RegistrationRequest>()
            .context("unmarshal registration payload")?;
        self.handler
            .register(typed)
            .await
            .with_context(|| format!("register application {}", message.application))?
            .marshal()
    }

    async fn deregister(&self, message: Message) -> Result<Response> {
        let typed = message
            .unmarshal::<DeregistrationRequest>()
            .context("unmarshal deregistration payload")?;
        self.handler
            .deregister(typed)
            .await
            .with_context(|| format!("deregister application {}", message.application))?
            .marshal()
    }
}

#[async_trait]
impl<H: MessageHandler> MessageProcessor for Dispatcher<H> {
    async fn process_message(&self, message: Message) -> Result<Response> {
        match message.kind {
            MessageKind::ForwardRequest => self.forward_request(message).await,
            MessageKind::Register => self.register(message).await,
            MessageKind::Deregister => self.deregister(message).await,
            other => Err(FuncieError::UnknownMessageKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use funcie_core::protocol::payloads::{
        DeregistrationResponse, ForwardRequestResponse, RegistrationResponse,
    };
    use funcie_core::{MessageBase, RawPayload};

    use super::*;

    struct Scripted {
        forward_err: fn() -> FuncieError,
    }

    #[async_trait]
    impl MessageHandler for Scripted {
        async fn register(&self, message: RegistrationMessage) -> Result<RegistrationResult> {
            Ok(RegistrationResult::success(message.id, RegistrationResponse::generate()))
        }

        async fn deregister(&self, message: DeregistrationMessage) -> Result<DeregistrationResult> {
            if message.payload.name == "ghost" {
                return Err(FuncieError::ApplicationNotFound("ghost".into()));
            }
            Ok(DeregistrationResult::success(message.id, DeregistrationResponse {}))
        }

        async fn forward_request(&self, message: ForwardRequestMessage) -> Result<ForwardRequestResult> {
            if message.application == "fail" {
                return Err((self.forward_err)());
            }
            Ok(ForwardRequestResult::success(
                message.id,
                ForwardRequestResponse {
                    body: message.payload.body,
                },
            ))
        }
    }

    fn dispatcher(forward_err: fn() -> FuncieError) -> Dispatcher<Scripted> {
        Dispatcher::new(Scripted { forward_err })
    }

    fn msg<P: serde::Serialize>(app: &str, kind: MessageKind, payload: P) -> Message {
        MessageBase::new(app, kind, payload, Duration::from_secs(1))
            .marshal()
            .unwrap()
    }

    fn forward(app: &str) -> Message {
        msg(
            app,
            MessageKind::ForwardRequest,
            ForwardRequest {
                body: RawPayload::from_json(r#""ping""#).unwrap(),
            },
        )
    }

    #[tokio::test]
    async fn forward_request_roundtrips_body() {
        let d = dispatcher(|| FuncieError::NoActiveConsumer);
        let m = forward("app");
        let resp = d.process_message(m.clone()).await.unwrap();
        assert_eq!(resp.id, m.id);
        let typed = resp.unmarshal::<ForwardRequestResponse>().unwrap();
        assert_eq!(typed.data.unwrap().body.as_str(), r#""ping""#);
    }

    #[tokio::test]
    async fn missing_consumer_and_missing_app_look_the_same() {
        for make in [
            (|| FuncieError::NoActiveConsumer) as fn() -> FuncieError,
            || FuncieError::ApplicationNotFound("fail".into()).wrap("lookup"),
        ] {
            let resp = dispatcher(make).process_message(forward("fail")).await.unwrap();
            let err = resp.error.unwrap();
            assert_eq!(err.code, ErrorCode::NoActiveConsumer);
            assert!(resp.data.is_none());
        }
    }

    #[tokio::test]
    async fn other_forward_failures_are_wrapped() {
        let d = dispatcher(|| FuncieError::Transport("socket closed".into()));
        let m = forward("fail");
        let err = d.process_message(m.clone()).await.unwrap_err();
        assert!(err.to_string().starts_with(&format!("forward request {}", m.id)));
        assert!(matches!(err.root(), FuncieError::Transport(_)));
    }

    #[tokio::test]
    async fn register_and_deregister() {
        let d = dispatcher(|| FuncieError::NoActiveConsumer);
        let reg = msg(
            "app",
            MessageKind::Register,
            RegistrationRequest {
                name: "app".into(),
                endpoint: None,
            },
        );
        let resp = d.process_message(reg).await.unwrap();
        assert!(resp.unmarshal::<RegistrationResponse>().unwrap().data.is_some());

        let dereg = msg(
            "ghost",
            MessageKind::Deregister,
            DeregistrationRequest {
                name: "ghost".into(),
            },
        );
        let err = d.process_message(dereg).await.unwrap_err();
        assert_eq!(err.to_string(), "deregister application ghost: application not found: ghost");
    }

    #[tokio::test]
    async fn bad_payload_and_unknown_kind() {
        let d = dispatcher(|| FuncieError::NoActiveConsumer);
        let bad = msg("app", MessageKind::Register, 42);
        assert_eq!(
            d.process_message(bad).await.unwrap_err().code(),
            ErrorCode::BadPayload
        );

        let ping = Message::new("app", MessageKind::Ping, None, Duration::from_secs(1));
        assert!(matches!(
            d.process_message(ping).await.unwrap_err(),
            FuncieError::UnknownMessageKind(k) if k == "PING"
        ));
    }
}
