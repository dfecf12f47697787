//! In-process stand-in for a Redis server.
//!
//! Implements the subset of commands in [`RedisClient`] with the same
//! observable semantics (subscriber counts, blocking pops, hash deletes), so
//! the Redis transport can run inside a single process and under test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use funcie_core::Result;

use super::client::{PubSubMessage, PubSubSession, RedisClient};

type Subscribers = HashMap<String, HashMap<u64, mpsc::UnboundedSender<PubSubMessage>>>;

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Subscribers>,
    next_session: AtomicU64,
    lists: DashMap<String, VecDeque<String>>,
    pushed: Notify,
    hashes: DashMap<String, HashMap<String, String>>,
}

#[derive(Clone, Default)]
pub struct MemoryRedis {
    inner: Arc<Inner>,
}

impl MemoryRedis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(channel)
            .map_or(0, HashMap::len)
    }

    /// Number of values waiting on a list.
    pub fn list_len(&self, key: &str) -> usize {
        self.inner.lists.get(key).map_or(0, |l| l.len())
    }

    fn pop(&self, key: &str) -> Option<String> {
        let value = self.inner.lists.get_mut(key)?.pop_back();
        self.inner.lists.remove_if(key, |_, list| list.is_empty());
        value
    }
}

#[async_trait]
impl RedisClient for MemoryRedis {
    async fn publish(&self, channel: &str, payload: &str) -> Result<i64> {
        let mut subscribers = self.inner.subscribers.lock();
        let Some(sessions) = subscribers.get_mut(channel) else {
            return Ok(0);
        };
        let msg = PubSubMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        sessions.retain(|_, tx| tx.send(msg.clone()).is_ok());
        let delivered = sessions.len() as i64;
        if sessions.is_empty() {
            subscribers.remove(channel);
        }
        Ok(delivered)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<String>>> {
        // Same rounding as Redis: a zero millisecond timeout blocks forever.
        let deadline = (timeout.as_millis() > 0).then(|| tokio::time::Instant::now() + timeout);
        loop {
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop(key) {
                return Ok(Some(vec![key.to_string(), value]));
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let removed = self.inner.hashes.remove(key).is_some() as u64
            + self.inner.lists.remove(key).is_some() as u64;
        Ok(removed)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .inner
            .hashes
            .get(key)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn open_pubsub(
        &self,
    ) -> Result<(Arc<dyn PubSubSession>, mpsc::UnboundedReceiver<PubSubMessage>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = MemoryPubSub {
            id: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
            inner: Arc::clone(&self.inner),
            tx,
        };
        Ok((Arc::new(session), rx))
    }
}

struct MemoryPubSub {
    id: u64,
    inner: Arc<Inner>,
    tx: mpsc::UnboundedSender<PubSubMessage>,
}

#[async_trait]
impl PubSubSession for MemoryPubSub {
    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.inner
            .subscribers
            .lock()
            .entry(channel.to_string())
            .or_default()
            .insert(self.id, self.tx.clone());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(sessions) = subscribers.get_mut(channel) {
            sessions.remove(&self.id);
            if sessions.is_empty() {
                subscribers.remove(channel);
            }
        }
        Ok(())
    }
}

impl Drop for MemoryPubSub {
    fn drop(&mut self) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|_, sessions| {
            sessions.remove(&self.id);
            !sessions.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn publish_counts_subscribers() {
        let redis = MemoryRedis::new();
        assert_eq!(redis.publish("c", "x").await.unwrap(), 0);

        let (session, mut rx) = redis.open_pubsub().await.unwrap();
        session.subscribe("c").await.unwrap();
        assert_eq!(redis.publish("c", "x").await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().payload, "x");

        session.unsubscribe("c").await.unwrap();
        assert_eq!(redis.publish("c", "y").await.unwrap(), 0);

        session.subscribe("c").await.unwrap();
        drop(session);
        assert_eq!(redis.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn brpop_waits_for_push() {
        let redis = MemoryRedis::new();
        let pusher = redis.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.rpush("k", "v").await.unwrap();
        });

        let reply = redis.brpop("k", Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, Some(vec!["k".to_string(), "v".to_string()]));
        assert_eq!(redis.list_len("k"), 0);
    }

    #[tokio::test]
    async fn brpop_times_out() {
        let redis = MemoryRedis::new();
        let reply = redis.brpop("k", Duration::from_millis(20)).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn zero_timeout_blocks_until_push() {
        let redis = MemoryRedis::new();
        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            redis.brpop("k", Duration::from_micros(500)),
        )
        .await;
        assert!(waiting.is_err());

        let pusher = redis.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.rpush("k", "v").await.unwrap();
        });
        let reply = redis.brpop("k", Duration::ZERO).await.unwrap();
        assert_eq!(reply, Some(vec!["k".to_string(), "v".to_string()]));
    }

    #[tokio::test]
    async fn del_reports_removed_keys() {
        let redis = MemoryRedis::new();
        redis.hset("h", "f", "v").await.unwrap();
        assert_eq!(redis.del("h").await.unwrap(), 1);
        assert_eq!(redis.del("h").await.unwrap(), 0);
        assert!(redis.hgetall("h").await.unwrap().is_empty());
    }
}
