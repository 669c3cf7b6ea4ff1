use std::sync::Arc;
use std::time::Instant;

use conduit_apply::Applier;
use conduit_core::{Kind, Result};
use conduit_events::{EventPublisher, Operation, Outcome, ReconcileEvent};
use conduit_schema::Resource;
use conduit_store::ResourceStore;
use conduit_transform::Pipeline;
use conduit_validate::ResourceLookup;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

/// Everything one reconciliation needs. Shared by every dispatcher and pool task.
pub(crate) struct Worker {
    pub(crate) store: Arc<ResourceStore>,
    pub(crate) pipeline: Pipeline,
    pub(crate) applier: Arc<dyn Applier>,
    pub(crate) resolver: Option<Arc<dyn ResourceLookup>>,
    pub(crate) events: EventPublisher,
}

impl Worker {
    pub(crate) fn reconciles(&self, kind: Kind) -> bool { self.pipeline.supports(kind) }

    /// Resolve references, transform, apply. Failures end up in the AFTER event, never in the caller.
    pub(crate) async fn reconcile(&self, op: Operation, resource: Arc<Resource>) -> Outcome {
        let t0 = Instant::now();
        let key = resource.key();
        if let Err(e) = self.ensure_references(&resource).await {
            warn!(%key, error = %e, "reference fetch failed");
        }

        self.events.publish(ReconcileEvent::started(op, &resource));
        let (outcome, event) = match self.pipeline.transform(&resource) {
            Err(e) => {
                warn!(%key, error = %e, "transform failed");
                let ev = ReconcileEvent::finished(op, &resource, Outcome::Failure, format!("Transform failed: {}", e))
                    .with_reason("TransformFailed")
                    .with_error_details(e.to_string());
                (Outcome::Failure, ev)
            }
            Ok(target) => {
                let res = self.applier.apply(&target).await;
                if res.is_success() {
                    info!(%key, target = target.kind(), name = target.name(), "applied");
                    let msg = format!("Applied {} {}", target.kind(), target.name());
                    (Outcome::Success, ReconcileEvent::finished(op, &resource, Outcome::Success, msg))
                } else {
                    let err = res.error_message();
                    warn!(%key, exit_code = res.exit_code, error = %err, "apply failed");
                    let ev = ReconcileEvent::finished(op, &resource, Outcome::Failure, format!("Apply failed: {}", err))
                        .with_reason("ApplyFailed")
                        .with_error_details(format!("exit code {}", res.exit_code));
                    (Outcome::Failure, ev)
                }
            }
        };

        histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("reconcile_total", 1u64, "kind" => key.kind.as_str(), "result" => outcome.as_str());
        self.events.publish(event);
        outcome
    }

    /// Deletes are mirrored and reported only; the external resource is left alone.
    pub(crate) fn record_delete(&self, resource: &Resource) {
        info!(key = %resource.key(), owner = ?resource.owner_ref(), "deleted upstream; no external apply for deletes");
        counter!("reconcile_deletes_total", 1u64, "kind" => resource.kind().as_str());
        self.events.publish(ReconcileEvent::started(Operation::Delete, resource));
        self.events.publish(ReconcileEvent::finished(
            Operation::Delete,
            resource,
            Outcome::Success,
            "Removed from store; external cleanup is left to the platform",
        ));
    }

    /// Make sure the references the transformer will read are in the store, fetching
    /// missing ones through the resolver when there is one.
    async fn ensure_references(&self, resource: &Resource) -> Result<()> {
        let ns = resource.key().namespace;
        match resource {
            Resource::ServiceAccount(sa) => {
                self.ensure(Kind::VirtualCluster, &ns, &sa.spec.cluster_ref).await?;
            }
            Resource::Topic(t) => {
                if let Some(sa) = self.ensure(Kind::ServiceAccount, &ns, &t.spec.service_ref).await? {
                    if let Some(sa) = sa.as_service_account() {
                        self.ensure(Kind::VirtualCluster, &ns, &sa.spec.cluster_ref).await?;
                    }
                }
            }
            Resource::GatewayPolicy(p) => {
                if let Some(scope) = self.ensure(Kind::Scope, &ns, &p.spec.scope_ref).await? {
                    if let Some(scope) = scope.as_scope() {
                        if let Some(cluster) = &scope.spec.cluster_ref {
                            self.ensure(Kind::VirtualCluster, &ns, cluster).await?;
                        }
                        if let Some(sa) = &scope.spec.service_account_ref {
                            self.ensure(Kind::ServiceAccount, &ns, sa).await?;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn ensure(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<Arc<Resource>>> {
        if let Some(found) = self.store.get(kind, namespace, name) {
            return Ok(Some(found));
        }
        let Some(resolver) = &self.resolver else {
            return Ok(None);
        };
        match resolver.lookup(kind, namespace, name).await? {
            Some(fetched) => {
                counter!("reference_fetches_total", 1u64, "kind" => kind.as_str());
                debug!(%kind, ns = %namespace, %name, "fetched missing reference");
                Ok(Some(self.store.upsert(fetched.with_namespace(namespace))))
            }
            None => Ok(None),
        }
    }
}
