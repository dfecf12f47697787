//! Shared application state for a funcie bastion.
//!
//! The role in the config decides what gets wired:
//! - server: a [`Publisher`](crate::transport::Publisher) for the configured transport behind
//!   `PublisherHandler`. Over websockets the processor caches absent
//!   consumers, and registrations on a socket clear the entry. Redis
//!   registrations never pass through the server, so that path is not
//!   cached.
//! - client: a [`Consumer`] connected to the server side, plus a
//!   `RegistryHandler` that registers local applications and forwards
//!   requests to them over HTTP.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use funcie_core::{FuncieError, Result, ResultExt};

use crate::config::{BastionConfig, RegistryBackend, Role, TransportKind};
use crate::dispatch::{
    CachingMessageProcessor, ClientHandlerRouter, Dispatcher, HttpApplicationClient, MessageProcessor,
    NoConsumerCache, PublisherHandler, RegistryHandler,
};
use crate::registry::{ApplicationRegistry, MemoryApplicationRegistry, RedisApplicationRegistry};
use crate::transport::redis::{MemoryRedis, RedisClient, RedisConnector, RedisConsumer, RedisPublisher};
use crate::transport::websocket::{
    ConnectionRegistry, WebsocketConsumer, WebsocketDialer, WebsocketPublisher, WebsocketServer,
};
use crate::transport::{Consumer, ResponseNotifier};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: BastionConfig,
    processor: Arc<dyn MessageProcessor>,
    websocket: Option<Arc<WebsocketServer>>,
    consumer: Option<Arc<dyn Consumer>>,
}

impl AppState {
    /// Build state for the configured role, connecting to Redis when needed.
    pub async fn new(cfg: BastionConfig) -> Result<Self> {
        let redis = match &cfg.redis {
            Some(section) if needs_redis_client(&cfg) => {
                let client = RedisConnector::connect(&section.address)
                    .await
                    .with_context(|| format!("connect to redis at {}", section.address))?;
                Some(Arc::new(client) as Arc<dyn RedisClient>)
            }
            _ => None,
        };
        Self::with_redis(cfg, redis)
    }

    /// Build state over an existing Redis client.
    ///
    /// The `memory` transport uses `redis` when given, so several bastions in
    /// one process can share a single [`MemoryRedis`].
    pub fn with_redis(cfg: BastionConfig, redis: Option<Arc<dyn RedisClient>>) -> Result<Self> {
        let redis = match (cfg.bastion.transport, redis) {
            (_, Some(client)) => Some(client),
            (TransportKind::Memory, None) => Some(Arc::new(MemoryRedis::new()) as Arc<dyn RedisClient>),
            (_, None) => None,
        };

        let inner = match cfg.bastion.role {
            Role::Server => build_server(cfg, redis)?,
            Role::Client => build_client(cfg, redis)?,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn cfg(&self) -> &BastionConfig {
        &self.inner.cfg
    }

    pub fn processor(&self) -> &Arc<dyn MessageProcessor> {
        &self.inner.processor
    }

    /// Socket acceptor, present only on a websocket server bastion.
    pub fn websocket_server(&self) -> Option<Arc<WebsocketServer>> {
        self.inner.websocket.clone()
    }

    /// Consumer, present only on a client bastion.
    pub fn consumer(&self) -> Option<Arc<dyn Consumer>> {
        self.inner.consumer.clone()
    }

    /// Connect the consumer and serve it in the background until `cancel`.
    ///
    /// Returns `None` on a server bastion.
    pub async fn start_consumer(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<Result<()>>>> {
        let Some(consumer) = self.consumer() else {
            return Ok(None);
        };
        consumer.connect().await.context("connect consumer")?;
        tracing::info!(transport = ?self.cfg().bastion.transport, "consumer connected");

        Ok(Some(tokio::spawn(async move {
            match consumer.consume(cancel).await {
                Err(FuncieError::Cancelled) => Ok(()),
                other => other,
            }
        })))
    }
}

fn needs_redis_client(cfg: &BastionConfig) -> bool {
    cfg.bastion.transport == TransportKind::Redis
        || (cfg.bastion.role == Role::Client && cfg.registry.backend == RegistryBackend::Redis)
}

fn require_redis(redis: &Option<Arc<dyn RedisClient>>, what: &str) -> Result<Arc<dyn RedisClient>> {
    redis
        .clone()
        .ok_or_else(|| FuncieError::Config(format!("{what} requires a redis connection")))
}

fn build_server(cfg: BastionConfig, redis: Option<Arc<dyn RedisClient>>) -> Result<AppStateInner> {
    let (processor, websocket): (Arc<dyn MessageProcessor>, Option<Arc<WebsocketServer>>) = match cfg.bastion.transport {
        TransportKind::Redis | TransportKind::Memory => {
            let publisher = RedisPublisher::new(require_redis(&redis, "redis transport")?, cfg.base_channel());
            let handler = PublisherHandler::new(Arc::new(publisher));
            let processor: Arc<dyn MessageProcessor> = Arc::new(Dispatcher::new(handler));
            (processor, None)
        }
        TransportKind::Websocket => {
            let registry = Arc::new(ConnectionRegistry::new());
            let notifier = Arc::new(ResponseNotifier::new());
            let no_consumer = Arc::new(NoConsumerCache::new());
            let server = WebsocketServer::new(
                Arc::clone(&registry),
                Arc::clone(&notifier),
                cfg.bastion.auth_token.clone(),
            )
            .with_no_consumer_cache(Arc::clone(&no_consumer));

            let handler = PublisherHandler::new(Arc::new(WebsocketPublisher::new(registry, notifier)));
            let processor: Arc<dyn MessageProcessor> =
                Arc::new(CachingMessageProcessor::with_cache(Dispatcher::new(handler), no_consumer));
            (processor, Some(Arc::new(server)))
        }
    };
    tracing::info!(transport = ?cfg.bastion.transport, "server bastion wired");

    Ok(AppStateInner {
        cfg,
        processor,
        websocket,
        consumer: None,
    })
}

fn build_client(cfg: BastionConfig, redis: Option<Arc<dyn RedisClient>>) -> Result<AppStateInner> {
    let router = Arc::new(ClientHandlerRouter::new());

    let consumer: Arc<dyn Consumer> = match cfg.bastion.transport {
        TransportKind::Redis | TransportKind::Memory => Arc::new(RedisConsumer::new(
            require_redis(&redis, "redis transport")?,
            cfg.base_channel(),
            Arc::clone(&router),
        )),
        TransportKind::Websocket => {
            let client = cfg.client.as_ref().ok_or_else(|| {
                FuncieError::Config("client.server_url is required for a websocket client".into())
            })?;
            let dialer = WebsocketDialer::new(client.server_url.clone(), client.auth_token.clone());
            Arc::new(WebsocketConsumer::new(
                dialer,
                Arc::clone(&router),
                cfg.bastion.request_ttl(),
            ))
        }
    };

    let registry: Arc<dyn ApplicationRegistry> = match cfg.registry.backend {
        RegistryBackend::Memory => Arc::new(MemoryApplicationRegistry::new()),
        RegistryBackend::Redis => Arc::new(RedisApplicationRegistry::new(require_redis(
            &redis,
            "redis registry",
        )?)),
    };

    let handler = RegistryHandler::new(
        registry,
        Arc::clone(&consumer),
        Arc::new(HttpApplicationClient::default()),
    );
    tracing::info!(
        transport = ?cfg.bastion.transport,
        registry = ?cfg.registry.backend,
        "client bastion wired"
    );

    Ok(AppStateInner {
        cfg,
        processor: Arc::new(Dispatcher::new(handler)),
        websocket: None,
        consumer: Some(consumer),
    })
}
