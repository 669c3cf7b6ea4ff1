//! File-driven commands: load resources through the ownership rules into a private
//! store, then transform (and optionally apply) them.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use conduit_apply::{CliDriver, Credentials};
use conduit_core::{Kind, ObjectKey};
use conduit_events::{AuditLog, EventPublisher};
use conduit_schema::{Resource, DEFAULT_NAMESPACE};
use conduit_store::ResourceStore;
use conduit_transform::{Pipeline, TargetResource, TransformError};
use conduit_validate::{GuardedStore, OwnershipValidator, StoreLookup};
use serde::Deserialize;
use tracing::{info, warn};

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s).context("reading stdin")?;
        return Ok(s);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Every non-empty document of a multi-document YAML stream, decoded by its `kind`.
pub(crate) fn parse_resources(text: &str) -> Result<Vec<Resource>> {
    let mut out = Vec::new();
    for (i, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_json::Value::deserialize(doc).with_context(|| format!("document {}", i + 1))?;
        if value.is_null() {
            continue;
        }
        let kind: Kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| anyhow!("document {} has no kind", i + 1))?
            .parse()?;
        out.push(Resource::from_value(kind, value).with_context(|| format!("document {} ({})", i + 1, kind))?);
    }
    Ok(out)
}

/// Create every resource in ownership-chain order, checking each against those before it.
pub(crate) async fn load(resources: Vec<Resource>, events: EventPublisher) -> Result<(Arc<ResourceStore>, Vec<Arc<Resource>>)> {
    let store = Arc::new(ResourceStore::new());
    let validator = OwnershipValidator::new(Arc::new(StoreLookup::new(store.clone())));
    let guarded = GuardedStore::new(store.clone(), validator, events);
    let mut resources = resources;
    resources.sort_by_key(|r| r.kind());
    let mut stored = Vec::with_capacity(resources.len());
    for r in resources {
        let key = r.key();
        let ns = r.namespace().unwrap_or(DEFAULT_NAMESPACE).to_string();
        let created = guarded.create(&ns, r).await.with_context(|| format!("rejected {}", key))?;
        stored.push(created);
    }
    Ok((store, stored))
}

/// Transform everything a transformer exists for, keeping failures per resource.
pub(crate) fn transform_all(
    pipeline: &Pipeline,
    resources: &[Arc<Resource>],
) -> (Vec<(ObjectKey, TargetResource)>, Vec<(ObjectKey, TransformError)>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for r in resources.iter().filter(|r| pipeline.supports(r.kind())) {
        match pipeline.transform(r) {
            Ok(t) => ok.push((r.key(), t)),
            Err(e) => failed.push((r.key(), e)),
        }
    }
    (ok, failed)
}

async fn prepare(path: &Path) -> Result<Vec<(ObjectKey, TargetResource)>> {
    let resources = parse_resources(&read_input(path)?)?;
    let events = EventPublisher::new();
    events.subscribe(Arc::new(AuditLog));
    let loaded = load(resources, events.clone()).await;
    events.close();
    let (store, stored) = loaded?;
    let (targets, failed) = transform_all(&Pipeline::standard(store), &stored);
    for (key, e) in &failed {
        warn!(%key, error = %e, "transform failed");
    }
    if !failed.is_empty() {
        bail!("{} of {} resources failed to transform", failed.len(), failed.len() + targets.len());
    }
    Ok(targets)
}

pub async fn render(path: &Path) -> Result<()> {
    for (key, target) in prepare(path).await? {
        info!(%key, target = target.kind(), "rendered");
        print!("---\n{}", target.to_yaml()?);
    }
    Ok(())
}

pub async fn apply(path: &Path, dry_run: bool) -> Result<()> {
    let targets = prepare(path).await?;
    let credentials = if dry_run { Credentials::load().ok() } else { Some(Credentials::load()?) };
    let driver = CliDriver::from_env(credentials);
    let mut failures = 0usize;
    for (key, target) in &targets {
        let result = if dry_run { driver.apply_dry_run(target).await } else { driver.apply(target).await };
        if result.is_success() {
            print!("{}", result.stdout);
        } else {
            failures += 1;
            eprintln!("{}: {}", key, result.error_message());
        }
    }
    if failures > 0 {
        bail!("{} of {} applies failed", failures, targets.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"
apiVersion: messaging.example.com/v1
kind: Topic
metadata: {name: orders, namespace: team-a}
spec: {serviceRef: sa1, name: orders.v1, applicationServiceRef: app1}
---
apiVersion: messaging.example.com/v1
kind: ServiceAccount
metadata: {name: sa1, namespace: team-a}
spec: {name: sa1, dn: ["CN=orders,OU=team"], clusterRef: c1, applicationServiceRef: app1}
---
---
apiVersion: messaging.example.com/v1
kind: VirtualCluster
metadata: {name: c1, namespace: team-a}
spec: {clusterId: cluster-one, applicationServiceRef: app1}
---
apiVersion: messaging.example.com/v1
kind: ApplicationService
metadata: {name: app1, namespace: team-a}
spec: {name: app1}
"#;

    #[test]
    fn parses_multi_document_streams() {
        let rs = parse_resources(CHAIN).unwrap();
        assert_eq!(rs.len(), 4);
        assert_eq!(rs[0].kind(), Kind::Topic);
        assert!(parse_resources("kind: Widget\nmetadata: {name: x}\n").is_err());
        assert!(parse_resources("metadata: {name: x}\n").is_err());
    }

    #[tokio::test]
    async fn loads_in_chain_order_and_transforms() {
        let (store, stored) = load(parse_resources(CHAIN).unwrap(), EventPublisher::with_capacity(8)).await.unwrap();
        let kinds: Vec<_> = stored.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![Kind::ApplicationService, Kind::VirtualCluster, Kind::ServiceAccount, Kind::Topic]);
        assert!(stored.iter().all(|r| r.uid().is_some()));

        let (targets, failed) = transform_all(&Pipeline::standard(store), &stored);
        assert!(failed.is_empty());
        assert_eq!(targets.len(), 3);
        let topic = targets.iter().find(|(k, _)| k.kind == Kind::Topic).unwrap();
        assert_eq!(topic.1.metadata().cluster.as_deref(), Some("cluster-one"));
    }

    #[tokio::test]
    async fn ownership_violations_reject_the_file() {
        let bad = CHAIN.replace("{serviceRef: sa1, name: orders.v1, applicationServiceRef: app1}", "{serviceRef: sa1, name: orders.v1, applicationServiceRef: app2}");
        let err = load(parse_resources(&bad).unwrap(), EventPublisher::with_capacity(8)).await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("rejected Topic/team-a/orders"), "{}", msg);
        assert!(msg.contains("owned by 'app1', not 'app2'"), "{}", msg);
    }
}
