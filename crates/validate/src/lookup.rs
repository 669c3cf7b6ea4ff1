use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{ConduitError, Kind, ObjectKey, Result};
use conduit_schema::{api_resource, Resource};
use conduit_store::ResourceStore;
use kube::api::{Api, DynamicObject};
use kube::Client;
use tracing::debug;

/// Resolves references by `(kind, namespace, name)`. `Ok(None)` means the resource is absent.
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn lookup(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<Resource>>;
}

/// Reads the in-memory store.
#[derive(Clone)]
pub struct StoreLookup {
    store: Arc<ResourceStore>,
}

impl StoreLookup {
    pub fn new(store: Arc<ResourceStore>) -> Self { Self { store } }
}

#[async_trait]
impl ResourceLookup for StoreLookup {
    async fn lookup(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<Resource>> {
        Ok(self.store.get(kind, namespace, name).map(|r| (*r).clone()))
    }
}

/// Reads the live platform API.
#[derive(Clone)]
pub struct KubeLookup {
    client: Client,
}

impl KubeLookup {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl ResourceLookup for KubeLookup {
    async fn lookup(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<Resource>> {
        let ar = api_resource(kind);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let key = || ObjectKey::new(kind, namespace, name);
        let found = api
            .get_opt(name)
            .await
            .map_err(|e| ConduitError::Lookup { key: key(), reason: e.to_string() })?;
        let Some(obj) = found else {
            debug!(kind = %kind, ns = %namespace, name = %name, "reference not found on platform");
            return Ok(None);
        };
        let value = serde_json::to_value(&obj).map_err(|e| ConduitError::Protocol(e.to_string()))?;
        let resource = Resource::from_value(kind, value)
            .map_err(|e| ConduitError::Protocol(format!("decoding {}: {}", key(), e)))?;
        Ok(Some(resource))
    }
}
