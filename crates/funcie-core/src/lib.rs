//! funcie core: transport-agnostic protocol model, payload types, and errors.
//!
//! This crate defines the wire-level contracts shared by the bastion runtime,
//! the Redis and websocket transports, and any client that speaks to a
//! bastion over `/dispatch`. It carries no transport or runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed payloads
//! surface as [`FuncieError`] so a bad message never takes a process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod application;
pub mod error;
pub mod protocol;

pub use application::{Application, Endpoint};
pub use error::{ErrorCode, FuncieError, ProxyError, Result, ResultExt};
pub use protocol::{Message, MessageBase, MessageKind, RawPayload, Response, ResponseBase};
