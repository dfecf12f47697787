use async_trait::async_trait;
use dashmap::DashMap;

use funcie_core::{Application, FuncieError, Result};

use super::ApplicationRegistry;

/// Process-local registry. Lost on restart.
#[derive(Default)]
pub struct MemoryApplicationRegistry {
    apps: DashMap<String, Application>,
}

impl MemoryApplicationRegistry {
    pub fn new() -> Self {
        Self {
            apps: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[async_trait]
impl ApplicationRegistry for MemoryApplicationRegistry {
    async fn register(&self, application: Application) -> Result<()> {
        tracing::debug!(application = %application.name, endpoint = %application.endpoint, "registering application");
        self.apps.insert(application.name.clone(), application);
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<()> {
        self.apps
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FuncieError::ApplicationNotFound(name.to_string()))
    }

    async fn get_application(&self, name: &str) -> Result<Application> {
        self.apps
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| FuncieError::ApplicationNotFound(name.to_string()))
    }
}
