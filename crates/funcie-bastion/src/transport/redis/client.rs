//! The Redis commands the transport and registry rely on, and the
//! `redis`-crate implementation of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};

use funcie_core::{FuncieError, Result};

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: String,
}

/// Subscription control for one pub/sub session. Messages arrive on the
/// receiver returned alongside it by [`RedisClient::open_pubsub`].
#[async_trait]
pub trait PubSubSession: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<()>;
    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}

#[async_trait]
pub trait RedisClient: Send + Sync {
    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: &str) -> Result<i64>;

    /// Raw `BRPOP` reply: `[key, value]`, or `None` on timeout.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<String>>>;

    async fn rpush(&self, key: &str, value: &str) -> Result<()>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Returns the number of keys removed.
    async fn del(&self, key: &str) -> Result<u64>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn open_pubsub(
        &self,
    ) -> Result<(Arc<dyn PubSubSession>, mpsc::UnboundedReceiver<PubSubMessage>)>;
}

fn redis_err(context: &str, err: ::redis::RedisError) -> FuncieError {
    FuncieError::Transport(format!("redis {context}: {err}"))
}

/// Connection to a Redis server.
pub struct RedisConnector {
    client: ::redis::Client,
    conn: ::redis::aio::MultiplexedConnection,
}

impl RedisConnector {
    pub async fn connect(address: &str) -> Result<Self> {
        let client = ::redis::Client::open(address).map_err(|e| redis_err("open client", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| redis_err("connect", e))?;
        tracing::info!(address = %address, "connected to redis");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl RedisClient for RedisConnector {
    async fn publish(&self, channel: &str, payload: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        ::redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("PUBLISH", e))
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<String>>> {
        // A blocking pop would stall every command pipelined behind it.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| redis_err("connect", e))?;
        ::redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("BRPOP", e))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _len: i64 = ::redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("RPUSH", e))?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _added: i64 = ::redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("HSET", e))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        ::redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("DEL", e))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        ::redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("HGETALL", e))
    }

    async fn open_pubsub(
        &self,
    ) -> Result<(Arc<dyn PubSubSession>, mpsc::UnboundedReceiver<PubSubMessage>)> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| redis_err("open pubsub", e))?;
        let (sink, stream) = pubsub.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(channel = %msg.get_channel_name(), error = %e, "dropping non-text pubsub payload");
                        continue;
                    }
                };
                let msg = PubSubMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                };
                if tx.send(msg).is_err() {
                    break;
                }
            }
            tracing::debug!("redis pubsub stream ended");
        });

        Ok((Arc::new(RedisPubSub { sink: Mutex::new(sink) }), rx))
    }
}

struct RedisPubSub {
    sink: Mutex<::redis::aio::PubSubSink>,
}

#[async_trait]
impl PubSubSession for RedisPubSub {
    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.sink
            .lock()
            .await
            .subscribe(channel)
            .await
            .map_err(|e| redis_err("SUBSCRIBE", e))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.sink
            .lock()
            .await
            .unsubscribe(channel)
            .await
            .map_err(|e| redis_err("UNSUBSCRIBE", e))
    }
}
