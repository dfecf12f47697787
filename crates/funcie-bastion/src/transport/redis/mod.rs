//! Redis transport.
//!
//! Messages for an application are published on `{base}:app:{application}`.
//! The publisher reads the subscriber count from the publish reply to detect
//! an absent consumer, then `BRPOP`s `{base}:resp:{message_id}` for at most
//! the message TTL. The consumer answers with `RPUSH` on the same key.

pub mod client;
pub mod consumer;
pub mod keys;
pub mod memory;
pub mod publisher;

pub use client::{PubSubMessage, PubSubSession, RedisClient, RedisConnector};
pub use consumer::RedisConsumer;
pub use keys::{channel_for_application, response_key};
pub use memory::MemoryRedis;
pub use publisher::RedisPublisher;
