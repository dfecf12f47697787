//! Registry stored as one Redis hash per application, surviving restarts.

use std::sync::Arc;

use async_trait::async_trait;

use funcie_core::{Application, Endpoint, FuncieError, Result, ResultExt};

use super::ApplicationRegistry;
use crate::transport::redis::RedisClient;

const APP_KEY_BASE: &str = "funcie:apps";
const ENDPOINT_FIELD: &str = "endpoint";

pub struct RedisApplicationRegistry {
    client: Arc<dyn RedisClient>,
}

impl RedisApplicationRegistry {
    pub fn new(client: Arc<dyn RedisClient>) -> Self {
        Self { client }
    }
}

fn app_key(name: &str) -> String {
    format!("{APP_KEY_BASE}:{name}")
}

#[async_trait]
impl ApplicationRegistry for RedisApplicationRegistry {
    async fn register(&self, application: Application) -> Result<()> {
        self.client
            .hset(
                &app_key(&application.name),
                ENDPOINT_FIELD,
                &application.endpoint.to_string(),
            )
            .await
            .with_context(|| format!("register application {}", application.name))
    }

    async fn unregister(&self, name: &str) -> Result<()> {
        let removed = self
            .client
            .del(&app_key(name))
            .await
            .with_context(|| format!("unregister application {name}"))?;
        if removed == 0 {
            return Err(FuncieError::ApplicationNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_application(&self, name: &str) -> Result<Application> {
        let key = app_key(name);
        let fields = self
            .client
            .hgetall(&key)
            .await
            .with_context(|| format!("get application with key {key}"))?;
        let Some(address) = fields.get(ENDPOINT_FIELD) else {
            return Err(FuncieError::ApplicationNotFound(name.to_string()));
        };
        let endpoint =
            Endpoint::parse(address).with_context(|| format!("parse endpoint of {name}"))?;
        Ok(Application::new(name, endpoint))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::transport::redis::MemoryRedis;

    #[tokio::test]
    async fn stores_endpoint_in_hash() {
        let redis = MemoryRedis::new();
        let reg = RedisApplicationRegistry::new(Arc::new(redis.clone()));
        reg.register(Application::new("app", Endpoint::new("http", "10.0.0.2", 8086)))
            .await
            .unwrap();

        let fields = redis.hgetall("funcie:apps:app").await.unwrap();
        assert_eq!(fields.get("endpoint").unwrap(), "http://10.0.0.2:8086");

        let app = reg.get_application("app").await.unwrap();
        assert_eq!(app.endpoint, Endpoint::new("http", "10.0.0.2", 8086));
    }

    #[tokio::test]
    async fn missing_application_is_not_found() {
        let reg = RedisApplicationRegistry::new(Arc::new(MemoryRedis::new()));
        assert!(matches!(
            reg.get_application("ghost").await.unwrap_err(),
            FuncieError::ApplicationNotFound(_)
        ));
        assert!(matches!(
            reg.unregister("ghost").await.unwrap_err(),
            FuncieError::ApplicationNotFound(_)
        ));
    }
}
