//! Dispatch layer.
//!
//! - [`router`]: per-consumer routing by application name.
//! - [`processor`]: kind-based dispatch to a [`MessageHandler`].
//! - [`caching`]: negative cache for absent consumers.
//! - [`handlers`]: server and client bastion handlers.

pub mod app_client;
pub mod caching;
pub mod handlers;
pub mod processor;
pub mod router;

pub use app_client::{ApplicationClient, HttpApplicationClient};
pub use caching::{CachingMessageProcessor, NoConsumerCache};
pub use handlers::{ApplicationForwarder, PublisherHandler, RegistryHandler};
pub use processor::{Dispatcher, MessageHandler, MessageProcessor};
pub use router::{function_handler, ClientHandler, ClientHandlerRouter, FnHandler};
