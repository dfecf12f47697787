//! Negative cache in front of a [`MessageProcessor`].
//!
//! Remembers applications that recently had no consumer so bursts of
//! forwarded requests fail fast instead of each paying a round trip.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use funcie_core::{
    ErrorCode, FuncieError, Message, MessageKind, ProxyError, Response, Result,
};

use super::processor::MessageProcessor;

/// How long a "no consumer" result is trusted.
pub const NO_CONSUMER_TTL: Duration = Duration::from_secs(60);

/// Applications that recently had no consumer.
///
/// Shared between the caching processor and whatever learns about new
/// consumers, so a registration can clear an entry before it expires.
pub struct NoConsumerCache {
    window: Duration,
    entries: DashMap<String, Instant>,
}

impl Default for NoConsumerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NoConsumerCache {
    pub fn new() -> Self {
        Self::with_window(NO_CONSUMER_TTL)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// Fresh entry for `application`, dropping a stale one.
    pub fn is_absent(&self, application: &str) -> bool {
        let Some(since) = self.entries.get(application).map(|r| *r.value()) else {
            return false;
        };
        if since.elapsed() < self.window {
            return true;
        }
        self.entries.remove(application);
        false
    }

    pub fn record(&self, application: &str) {
        tracing::debug!(
            application = %application,
            window_ms = self.window.as_millis() as u64,
            "no consumer, caching"
        );
        self.entries.insert(application.to_string(), Instant::now());
    }

    /// A consumer for `application` may be present again.
    pub fn forget(&self, application: &str) {
        if self.entries.remove(application).is_some() {
            tracing::debug!(application = %application, "no-consumer entry cleared");
        }
    }
}

pub struct CachingMessageProcessor<P> {
    inner: P,
    cache: Arc<NoConsumerCache>,
}

impl<P: MessageProcessor> CachingMessageProcessor<P> {
    pub fn new(inner: P) -> Self {
        Self::with_cache(inner, Arc::new(NoConsumerCache::new()))
    }

    pub fn with_window(inner: P, window: Duration) -> Self {
        Self::with_cache(inner, Arc::new(NoConsumerCache::with_window(window)))
    }

    pub fn with_cache(inner: P, cache: Arc<NoConsumerCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<NoConsumerCache> {
        &self.cache
    }

    async fn forward_request(&self, message: Message) -> Result<Response> {
        let application = message.application.clone();
        if self.cache.is_absent(&application) {
            tracing::debug!(application = %application, "no consumer (cached)");
            return Ok(Response::failure(
                message.id,
                ProxyError::new(
                    ErrorCode::NoActiveConsumer,
                    FuncieError::NoActiveConsumer.to_string(),
                ),
            ));
        }

        let result = self.inner.process_message(message).await;
        let absent = match &result {
            Err(err) => err.is_no_consumer(),
            Ok(resp) => resp.error.as_ref().is_some_and(ProxyError::is_no_consumer),
        };
        if absent {
            self.cache.record(&application);
        }
        result
    }
}

#[async_trait]
impl<P: MessageProcessor> MessageProcessor for CachingMessageProcessor<P> {
    async fn process_message(&self, message: Message) -> Result<Response> {
        match message.kind {
            MessageKind::ForwardRequest => self.forward_request(message).await,
            MessageKind::Register => {
                let application = message.application.clone();
                let result = self.inner.process_message(message).await;
                self.cache.forget(&application);
                result
            }
            MessageKind::Deregister => self.inner.process_message(message).await,
            other => Err(FuncieError::UnknownMessageKind(other.to_string())),
        }
    }
}
