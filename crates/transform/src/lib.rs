//! Conduit transform: per-kind mappings from messaging resources to the resources the
//! gateway/console tool applies. References are resolved through the store; a missing
//! reference fails that one transform.

#![forbid(unsafe_code)]

use std::sync::Arc;

use conduit_core::Kind;
use conduit_schema::Resource;
use conduit_store::ResourceStore;
use rustc_hash::FxHashMap;
use tracing::debug;

mod error;
pub mod model;
mod transformers;

pub use error::TransformError;
pub use model::TargetResource;
pub use transformers::{
    common_name, transform_cluster, transform_policy, transform_service_account, transform_topic, ClusterTransformer,
    PolicyTransformer, ServiceAccountTransformer, TopicTransformer, Transformer,
};

/// Kinds that produce a target resource and are therefore applied by the controller.
pub const RECONCILED_KINDS: [Kind; 4] = [Kind::VirtualCluster, Kind::ServiceAccount, Kind::Topic, Kind::GatewayPolicy];

/// Kind -> transformer registry bound to one store.
pub struct Pipeline {
    store: Arc<ResourceStore>,
    handlers: FxHashMap<Kind, Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self { store, handlers: FxHashMap::default() }
    }

    /// Pipeline with a transformer for every kind in [`RECONCILED_KINDS`].
    pub fn standard(store: Arc<ResourceStore>) -> Self {
        let mut p = Self::new(store);
        p.register(Box::new(ClusterTransformer));
        p.register(Box::new(ServiceAccountTransformer));
        p.register(Box::new(TopicTransformer));
        p.register(Box::new(PolicyTransformer));
        p
    }

    pub fn register(&mut self, t: Box<dyn Transformer>) {
        self.handlers.insert(t.kind(), t);
    }

    pub fn supports(&self, kind: Kind) -> bool { self.handlers.contains_key(&kind) }

    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn store(&self) -> &Arc<ResourceStore> { &self.store }

    pub fn transform(&self, source: &Resource) -> Result<TargetResource, TransformError> {
        let handler = self.handlers.get(&source.kind()).ok_or(TransformError::Unsupported(source.kind()))?;
        let out = handler.transform(source, &self.store)?;
        debug!(key = %source.key(), target = out.kind(), name = out.name(), "transformed");
        Ok(out)
    }
}
