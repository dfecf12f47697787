use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use funcie_core::{FuncieError, Result};

/// Shortest and longest accepted request TTL.
const MIN_TTL_MS: u64 = 1_000;
const MAX_TTL_MS: u64 = 3_600_000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BastionConfig {
    pub version: u32,

    #[serde(default)]
    pub bastion: BastionSection,

    #[serde(default)]
    pub redis: Option<RedisSection>,

    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default)]
    pub client: Option<ClientSection>,
}

impl BastionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(FuncieError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.bastion.validate()?;

        let needs_redis = self.bastion.transport == TransportKind::Redis
            || (self.bastion.role == Role::Client && self.registry.backend == RegistryBackend::Redis);
        if needs_redis && self.redis.is_none() {
            return Err(FuncieError::Config(
                "redis.address is required by the redis transport and registry".into(),
            ));
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }

        if self.bastion.role == Role::Client && self.bastion.transport == TransportKind::Websocket {
            let Some(client) = &self.client else {
                return Err(FuncieError::Config(
                    "client.server_url is required for a websocket client bastion".into(),
                ));
            };
            client.validate()?;
        }

        Ok(())
    }

    pub fn base_channel(&self) -> &str {
        self.redis
            .as_ref()
            .map_or(DEFAULT_BASE_CHANNEL, |r| r.base_channel.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publisher side: takes requests on `/dispatch` and sockets on `/ws`.
    #[default]
    Server,
    /// Consumer side: serves local applications.
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Redis,
    Websocket,
    /// In-process Redis stand-in.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BastionSection {
    #[serde(default)]
    pub role: Role,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_request_ttl_ms")]
    pub request_ttl_ms: u64,

    #[serde(default)]
    pub transport: TransportKind,

    /// Bearer token required on `/ws`.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for BastionSection {
    fn default() -> Self {
        Self {
            role: Role::default(),
            listen: default_listen(),
            request_ttl_ms: default_request_ttl_ms(),
            transport: TransportKind::default(),
            auth_token: None,
        }
    }
}

impl BastionSection {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TTL_MS..=MAX_TTL_MS).contains(&self.request_ttl_ms) {
            return Err(FuncieError::Config(format!(
                "bastion.request_ttl_ms must be between {MIN_TTL_MS} and {MAX_TTL_MS}"
            )));
        }
        self.listen_addr()?;
        if self.auth_token.as_deref().is_some_and(str::is_empty) {
            return Err(FuncieError::Config("bastion.auth_token must not be empty".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            FuncieError::Config(format!("bastion.listen must be a valid SocketAddr: {e}"))
        })
    }

    pub fn request_ttl(&self) -> Duration {
        Duration::from_millis(self.request_ttl_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisSection {
    pub address: String,

    #[serde(default = "default_base_channel")]
    pub base_channel: String,
}

impl RedisSection {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(FuncieError::Config("redis.address must not be empty".into()));
        }
        if self.base_channel.is_empty() || self.base_channel.contains(char::is_whitespace) {
            return Err(FuncieError::Config(
                "redis.base_channel must be a non-empty name without spaces".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default)]
    pub backend: RegistryBackend,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub server_url: String,

    #[serde(default)]
    pub auth_token: Option<String>,
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(FuncieError::Config(
                "client.server_url must be a ws:// or wss:// url".into(),
            ));
        }
        Ok(())
    }
}

const DEFAULT_BASE_CHANNEL: &str = "funcie";

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_request_ttl_ms() -> u64 {
    900_000
}
fn default_base_channel() -> String {
    DEFAULT_BASE_CHANNEL.into()
}
