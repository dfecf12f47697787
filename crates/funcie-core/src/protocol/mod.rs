//! Protocol model shared by every transport.
//!
//! - [`message`]: units of work with identity, kind, and TTL.
//! - [`response`]: the single result correlated to a message id.
//! - [`payload`]: lazily decoded JSON payload bytes.
//! - [`payloads`]: typed payloads carried by each message kind.
//!
//! Nothing here panics on malformed input; decode failures are reported as
//! `FuncieError::Serialization` naming the message they concern.

pub mod message;
pub mod payload;
pub mod payloads;
pub mod response;

pub use message::{Message, MessageBase, MessageKind};
pub use payload::RawPayload;
pub use response::{Response, ResponseBase};
