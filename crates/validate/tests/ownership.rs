#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{ConduitError, Kind, ObjectKey, Result};
use conduit_schema::*;
use conduit_store::ResourceStore;
use conduit_validate::{OwnershipValidator, ResourceLookup, StoreLookup};

const NS: &str = "team-a";

fn app(name: &str) -> Resource {
    ApplicationService::new(name, ApplicationServiceSpec { name: name.into() }).into()
}

fn vc(name: &str, owner: &str) -> Resource {
    VirtualCluster::new(
        name,
        VirtualClusterSpec { cluster_id: format!("{}-cluster", name), application_service_ref: owner.into(), auth_type: None },
    )
    .into()
}

fn sa(name: &str, cluster: &str, owner: &str) -> Resource {
    ServiceAccount::new(
        name,
        ServiceAccountSpec {
            name: name.into(),
            dn: vec![format!("CN={},OU=eng", name)],
            cluster_ref: cluster.into(),
            application_service_ref: owner.into(),
        },
    )
    .into()
}

fn topic(name: &str, sa: &str, owner: &str) -> Resource {
    Topic::new(
        name,
        TopicSpec {
            service_ref: sa.into(),
            name: name.into(),
            partitions: 6,
            replication_factor: 3,
            config: Default::default(),
            application_service_ref: owner.into(),
        },
    )
    .into()
}

fn acl(name: &str, sa: &str, owner: &str) -> Resource {
    Acl::new(
        name,
        AclSpec {
            service_ref: sa.into(),
            topic_ref: Some("t1".into()),
            consumer_group_ref: None,
            operations: vec![AclOperation::Read],
            host: "*".into(),
            permission: AclPermission::Allow,
            application_service_ref: owner.into(),
        },
    )
    .into()
}

fn group(name: &str, sa: &str, owner: &str) -> Resource {
    ConsumerGroup::new(
        name,
        ConsumerGroupSpec { service_ref: sa.into(), name: name.into(), pattern_type: PatternType::Literal, application_service_ref: owner.into() },
    )
    .into()
}

/// app1 -> c1 -> sa1, all in NS.
fn chain() -> (Arc<ResourceStore>, OwnershipValidator) {
    let store = Arc::new(ResourceStore::new());
    store.create(NS, app("app1")).unwrap();
    store.create(NS, vc("c1", "app1")).unwrap();
    store.create(NS, sa("sa1", "c1", "app1")).unwrap();
    let validator = OwnershipValidator::new(Arc::new(StoreLookup::new(store.clone())));
    (store, validator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_chain_is_valid_without_message() {
    let (_store, v) = chain();
    for r in [vc("c2", "app1"), sa("sa2", "c1", "app1"), topic("t1", "sa1", "app1"), acl("a1", "sa1", "app1"), group("g1", "sa1", "app1")] {
        let res = v.validate_create(&r, NS).await.unwrap();
        assert!(res.is_valid(), "{}: {:?}", r.key(), res.message());
        assert_eq!(res.message(), None);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn virtual_cluster_needs_its_application() {
    let (_store, v) = chain();
    let res = v.validate_create(&vc("c2", "ghost"), NS).await.unwrap();
    assert_eq!(res.message(), Some("Referenced ApplicationService 'ghost' does not exist"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_account_checks_app_then_cluster_owner() {
    let (store, v) = chain();
    let res = v.validate_create(&sa("sa2", "c1", "ghost"), NS).await.unwrap();
    assert_eq!(res.message(), Some("Referenced ApplicationService 'ghost' does not exist"));

    let res = v.validate_create(&sa("sa2", "nope", "app1"), NS).await.unwrap();
    assert_eq!(res.message(), Some("Referenced VirtualCluster 'nope' does not exist"));

    store.create(NS, app("app2")).unwrap();
    let res = v.validate_create(&sa("sa2", "c1", "app2"), NS).await.unwrap();
    assert_eq!(res.message(), Some("VirtualCluster 'c1' is owned by 'app1', not 'app2'"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_service_account_is_named() {
    let (_store, v) = chain();
    for r in [topic("t1", "sa-missing", "app1"), acl("a1", "sa-missing", "app1"), group("g1", "sa-missing", "app1")] {
        let res = v.validate_create(&r, NS).await.unwrap();
        assert!(!res.is_valid());
        assert!(res.message().unwrap().contains("sa-missing"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn references_resolve_in_the_given_namespace_only() {
    let (_store, v) = chain();
    let res = v.validate_create(&topic("t1", "sa1", "app1"), "team-b").await.unwrap();
    assert_eq!(res.message(), Some("Referenced ServiceAccount 'sa1' does not exist"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kinds_without_rules_are_valid() {
    let (_store, v) = chain();
    let scope: Resource = Scope::new(
        "s1",
        ScopeSpec { application_service_ref: "whoever".into(), cluster_ref: None, service_account_ref: None, group_ref: None },
    )
    .into();
    assert!(v.validate_create(&scope, NS).await.unwrap().is_valid());
    assert!(v.validate_create(&app("app9"), NS).await.unwrap().is_valid());
}

#[test]
fn owner_change_on_update_is_refused() {
    let store = Arc::new(ResourceStore::new());
    let v = OwnershipValidator::new(Arc::new(StoreLookup::new(store)));
    let res = v.validate_update(&vc("c1", "app1"), &vc("c1", "app2"));
    let msg = res.message().unwrap();
    assert!(msg.contains("'app1'") && msg.contains("'app2'"), "{}", msg);
    assert!(msg.ends_with("Only the original owner can modify this resource."));

    // other spec changes with the same owner are fine
    let mut changed = vc("c1", "app1");
    if let Resource::VirtualCluster(c) = &mut changed {
        c.spec.cluster_id = "renamed".into();
        c.spec.auth_type = Some(AuthType::SaslSsl);
    }
    assert!(v.validate_update(&vc("c1", "app1"), &changed).is_valid());

    let res = v.validate_update(&vc("c1", ""), &vc("c1", "app1"));
    assert_eq!(res.message(), Some("Resource must have applicationServiceRef"));
    assert!(!v.validate_update(&app("a"), &app("a")).is_valid());
}

#[test]
fn delete_compares_owner_strings() {
    let store = Arc::new(ResourceStore::new());
    let v = OwnershipValidator::new(Arc::new(StoreLookup::new(store)));
    let t = topic("t1", "sa1", "app1");
    assert!(v.validate_delete(&t, "app1").is_valid());
    let res = v.validate_delete(&t, "app2");
    assert_eq!(res.message(), Some("ApplicationService 'app2' cannot delete resource owned by 'app1'"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn topic_rejected_when_service_account_owned_elsewhere() {
    let (store, v) = chain();
    store.create(NS, app("app2")).unwrap();
    let res = v.validate_create(&topic("t1", "sa1", "app2"), NS).await.unwrap();
    assert!(!res.is_valid());
    assert!(res.message().unwrap().contains("owned by 'app1', not 'app2'"));
}

struct Unreachable;

#[async_trait]
impl ResourceLookup for Unreachable {
    async fn lookup(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<Resource>> {
        Err(ConduitError::Lookup { key: ObjectKey::new(kind, namespace, name), reason: "connection refused".into() })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_errors_propagate() {
    let v = OwnershipValidator::new(Arc::new(Unreachable));
    let err = v.validate_create(&topic("t1", "sa1", "app1"), NS).await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
}
