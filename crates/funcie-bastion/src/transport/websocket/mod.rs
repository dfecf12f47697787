//! Websocket transport.
//!
//! A client bastion dials the server bastion once and registers each of its
//! applications over that socket. Both ends run the same read loop
//! ([`exchange`]); envelopes tag each frame as a request or a response.

pub mod acceptor;
pub mod connection;
pub mod consumer;
pub mod dialer;
pub mod envelope;
pub mod exchange;
pub mod processor;
pub mod publisher;
pub mod registry;

/// `Sec-WebSocket-Protocol` token both ends insist on.
pub const SUBPROTOCOL: &str = "funcie";

pub use acceptor::{ws_upgrade, WebsocketServer};
pub use connection::{ApplicationConnection, Connection, Frame, FrameStream, SinkConnection};
pub use consumer::WebsocketConsumer;
pub use dialer::WebsocketDialer;
pub use envelope::{Envelope, EnvelopeKind};
pub use publisher::WebsocketPublisher;
pub use registry::{ConnectionRegistry, ExclusiveConnection};
