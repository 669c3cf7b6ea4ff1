use std::sync::Arc;

use conduit_core::Kind;
use conduit_schema::{AuthType, GatewayPolicy, Resource, ServiceAccount, Topic, VirtualCluster, DEFAULT_NAMESPACE};
use conduit_store::ResourceStore;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::*;
use crate::TransformError;

/// One mapping per source kind. Implementations only read the store.
pub trait Transformer: Send + Sync {
    fn kind(&self) -> Kind;
    fn transform(&self, source: &Resource, store: &ResourceStore) -> Result<TargetResource, TransformError>;
}

fn mismatch(expected: Kind, source: &Resource) -> TransformError {
    TransformError::KindMismatch { expected, actual: source.kind() }
}

fn resolve(
    store: &ResourceStore,
    context: &'static str,
    kind: Kind,
    namespace: &str,
    name: &str,
) -> Result<Arc<Resource>, TransformError> {
    store.get(kind, namespace, name).ok_or_else(|| TransformError::Unresolved {
        context,
        kind,
        name: name.to_string(),
        namespace: namespace.to_string(),
    })
}

fn resolve_cluster(store: &ResourceStore, context: &'static str, namespace: &str, name: &str) -> Result<VirtualCluster, TransformError> {
    let r = resolve(store, context, Kind::VirtualCluster, namespace, name)?;
    r.as_virtual_cluster().cloned().ok_or_else(|| mismatch(Kind::VirtualCluster, &r))
}

fn resolve_service_account(store: &ResourceStore, context: &'static str, namespace: &str, name: &str) -> Result<ServiceAccount, TransformError> {
    let r = resolve(store, context, Kind::ServiceAccount, namespace, name)?;
    r.as_service_account().cloned().ok_or_else(|| mismatch(Kind::ServiceAccount, &r))
}

/// VirtualCluster -> gateway virtual cluster with ACLs switched on.
pub fn transform_cluster(source: &VirtualCluster) -> GatewayVirtualCluster {
    TargetObject {
        api_version: GATEWAY_API_VERSION.to_string(),
        kind: "VirtualCluster".to_string(),
        metadata: TargetMetadata { name: source.spec.cluster_id.clone(), ..Default::default() },
        spec: VirtualClusterSpec { acl_enabled: true },
    }
}

static CN: Lazy<Regex> = Lazy::new(|| Regex::new(r"CN=([^,]+)").unwrap());

/// Common name of a certificate subject, or the whole subject when it has none.
pub fn common_name(subject: &str) -> String {
    CN.captures(subject)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| subject.to_string())
}

/// ServiceAccount -> external gateway service account on its cluster.
pub fn transform_service_account(source: &ServiceAccount, store: &ResourceStore) -> Result<GatewayServiceAccount, TransformError> {
    let ns = source.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let cluster = resolve_cluster(store, "cluster", ns, &source.spec.cluster_ref)?;
    let external_names = match cluster.spec.auth_type.unwrap_or_default() {
        AuthType::SaslSsl => vec![source.spec.name.clone()],
        AuthType::Mtls if source.spec.dn.is_empty() => vec![source.spec.name.clone()],
        AuthType::Mtls => source.spec.dn.iter().map(|dn| common_name(dn)).collect(),
    };
    Ok(TargetObject {
        api_version: GATEWAY_API_VERSION.to_string(),
        kind: "GatewayServiceAccount".to_string(),
        metadata: TargetMetadata {
            name: source.spec.name.clone(),
            v_cluster: Some(cluster.spec.cluster_id),
            ..Default::default()
        },
        spec: ServiceAccountSpec { type_: "EXTERNAL".to_string(), external_names },
    })
}

/// Topic -> console topic placed on the cluster of its owning service account.
pub fn transform_topic(source: &Topic, store: &ResourceStore) -> Result<ConsoleTopic, TransformError> {
    let ns = source.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let sa = resolve_service_account(store, "cluster", ns, &source.spec.service_ref)?;
    let cluster = resolve_cluster(store, "cluster", ns, &sa.spec.cluster_ref)?;
    let configs = if source.spec.config.is_empty() { None } else { Some(source.spec.config.clone()) };
    Ok(TargetObject {
        api_version: CONSOLE_API_VERSION.to_string(),
        kind: "Topic".to_string(),
        metadata: TargetMetadata { name: source.spec.name.clone(), cluster: Some(cluster.spec.cluster_id), ..Default::default() },
        spec: TopicSpec {
            partitions: source.spec.partitions,
            replication_factor: source.spec.replication_factor,
            configs,
        },
    })
}

/// GatewayPolicy -> interceptor named `<namespace>--<name>`, scoped through its Scope resource.
pub fn transform_policy(source: &GatewayPolicy, store: &ResourceStore) -> Result<GatewayInterceptor, TransformError> {
    let ns = source.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let name = source.metadata.name.as_deref().unwrap_or_default();
    let scope = policy_scope(source, ns, store)?;
    Ok(TargetObject {
        api_version: GATEWAY_API_VERSION.to_string(),
        kind: "Interceptor".to_string(),
        metadata: TargetMetadata { name: format!("{}--{}", ns, name), scope, ..Default::default() },
        spec: InterceptorSpec {
            plugin_class: source.spec.policy_type.plugin_class().to_string(),
            priority: source.spec.priority,
            config: source.spec.config.clone(),
        },
    })
}

fn policy_scope(source: &GatewayPolicy, ns: &str, store: &ResourceStore) -> Result<Option<InterceptorScope>, TransformError> {
    let r = resolve(store, "scope", Kind::Scope, ns, &source.spec.scope_ref)?;
    let scope = r.as_scope().ok_or_else(|| mismatch(Kind::Scope, &r))?;
    let mut out = InterceptorScope::default();
    if let Some(cluster_ref) = &scope.spec.cluster_ref {
        out.v_cluster = Some(resolve_cluster(store, "scope", ns, cluster_ref)?.spec.cluster_id);
    }
    if let Some(sa_ref) = &scope.spec.service_account_ref {
        out.username = Some(resolve_service_account(store, "scope", ns, sa_ref)?.spec.name);
    }
    out.group = scope.spec.group_ref.clone();
    Ok(if out.is_empty() { None } else { Some(out) })
}

pub struct ClusterTransformer;
pub struct ServiceAccountTransformer;
pub struct TopicTransformer;
pub struct PolicyTransformer;

impl Transformer for ClusterTransformer {
    fn kind(&self) -> Kind { Kind::VirtualCluster }

    fn transform(&self, source: &Resource, _store: &ResourceStore) -> Result<TargetResource, TransformError> {
        let vc = source.as_virtual_cluster().ok_or_else(|| mismatch(self.kind(), source))?;
        Ok(TargetResource::VirtualCluster(transform_cluster(vc)))
    }
}

impl Transformer for ServiceAccountTransformer {
    fn kind(&self) -> Kind { Kind::ServiceAccount }

    fn transform(&self, source: &Resource, store: &ResourceStore) -> Result<TargetResource, TransformError> {
        let sa = source.as_service_account().ok_or_else(|| mismatch(self.kind(), source))?;
        transform_service_account(sa, store).map(TargetResource::ServiceAccount)
    }
}

impl Transformer for TopicTransformer {
    fn kind(&self) -> Kind { Kind::Topic }

    fn transform(&self, source: &Resource, store: &ResourceStore) -> Result<TargetResource, TransformError> {
        let topic = source.as_topic().ok_or_else(|| mismatch(self.kind(), source))?;
        transform_topic(topic, store).map(TargetResource::Topic)
    }
}

impl Transformer for PolicyTransformer {
    fn kind(&self) -> Kind { Kind::GatewayPolicy }

    fn transform(&self, source: &Resource, store: &ResourceStore) -> Result<TargetResource, TransformError> {
        let policy = source.as_gateway_policy().ok_or_else(|| mismatch(self.kind(), source))?;
        transform_policy(policy, store).map(TargetResource::Interceptor)
    }
}
