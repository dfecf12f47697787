//! Application registries: application name -> endpoint.
//!
//! Registering an existing name overwrites it (a reconnecting application is
//! the common case). Unregistering or looking up a missing name returns
//! [`FuncieError::ApplicationNotFound`](funcie_core::FuncieError) from every
//! backend.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use funcie_core::{Application, Result};

pub use memory::MemoryApplicationRegistry;
pub use redis::RedisApplicationRegistry;

#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    async fn register(&self, application: Application) -> Result<()>;
    async fn unregister(&self, name: &str) -> Result<()>;
    async fn get_application(&self, name: &str) -> Result<Application>;
}
