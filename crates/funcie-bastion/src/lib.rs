//! funcie bastion library entry.
//!
//! Wires application registries, the message processors, and the Redis and
//! websocket transports into a bastion that tunnels requests from a cloud
//! function to an application running elsewhere. Used by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod host;
pub mod ops;
pub mod registry;
pub mod router;
pub mod transport;
