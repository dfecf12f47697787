use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use funcie_core::{FuncieError, Message, Response, Result, ResultExt};

use super::client::RedisClient;
use super::keys::{channel_for_application, response_key};
use crate::transport::Publisher;

/// Shortest wait BRPOP can express. Redis rounds its timeout to
/// milliseconds and treats zero as "block forever".
pub const MIN_RESPONSE_WAIT: Duration = Duration::from_millis(1);

pub struct RedisPublisher {
    client: Arc<dyn RedisClient>,
    base_channel: String,
}

impl RedisPublisher {
    pub fn new(client: Arc<dyn RedisClient>, base_channel: impl Into<String>) -> Self {
        Self {
            client,
            base_channel: base_channel.into(),
        }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, message: Message) -> Result<Response> {
        if message.ttl < MIN_RESPONSE_WAIT {
            tracing::debug!(application = %message.application, message_id = %message.id, ttl = ?message.ttl, "ttl too short to wait on");
            return Err(FuncieError::TtlExceeded {
                id: message.id,
                ttl: message.ttl,
            });
        }

        let channel = channel_for_application(&self.base_channel, &message.application);
        let contents = message.to_json()?;

        let consumers = self
            .client
            .publish(&channel, &contents)
            .await
            .with_context(|| format!("publish message to channel {channel}"))?;
        if consumers == 0 {
            tracing::debug!(application = %message.application, message_id = %message.id, "no subscribers");
            return Err(FuncieError::NoActiveConsumer);
        }

        let key = response_key(&self.base_channel, &message.id);
        let reply = self
            .client
            .brpop(&key, message.ttl)
            .await
            .context("wait for response from consumer")?;
        let Some(reply) = reply else {
            return Err(FuncieError::TtlExceeded {
                id: message.id,
                ttl: message.ttl,
            });
        };

        // First entry is the key, second the serialized response.
        if reply.len() != 2 {
            panic!(
                "expected BRPOP reply of two items for {key}, got {}",
                reply.len()
            );
        }
        let resp = Response::from_slice(reply[1].as_bytes())
            .context("unmarshal response from consumer")?;
        tracing::debug!(application = %message.application, message_id = %resp.id, "response received");
        Ok(resp)
    }
}
