//! Transports for the synchronous exchange.
//!
//! A [`Publisher`] sends a message and blocks for its response; a
//! [`Consumer`] receives messages for the applications it subscribed and
//! answers them through a [`ClientHandler`](crate::dispatch::ClientHandler).
//!
//! - [`redis`]: pub/sub with a response list per message.
//! - [`websocket`]: one persistent socket per consumer, both directions.
//! - [`notifier`], [`store`]: correlation and connection bookkeeping
//!   shared by the transports.

pub mod notifier;
pub mod redis;
pub mod store;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use funcie_core::{Message, Response, Result};

use crate::dispatch::ClientHandler;

pub use notifier::ResponseNotifier;
pub use store::{ConnectionStore, SharedConnection};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver `message` and wait up to its TTL for the response.
    ///
    /// Fails fast with `NoActiveConsumer` when nobody is listening.
    async fn publish(&self, message: Message) -> Result<Response>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Establish the underlying session.
    async fn connect(&self) -> Result<()>;

    /// Serve messages until `cancel` fires or the session ends.
    async fn consume(&self, cancel: CancellationToken) -> Result<()>;

    /// Start receiving messages for `application`.
    async fn subscribe(&self, application: &str, handler: Arc<dyn ClientHandler>) -> Result<()>;

    async fn unsubscribe(&self, application: &str) -> Result<()>;
}
