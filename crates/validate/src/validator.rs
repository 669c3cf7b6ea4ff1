use std::sync::Arc;

use conduit_core::{Kind, Result, ValidationResult};
use conduit_schema::Resource;
use metrics::counter;
use tracing::debug;

use crate::ResourceLookup;

/// Enforces the ownership chain ApplicationService -> VirtualCluster -> ServiceAccount ->
/// {Topic, ConsumerGroup, ACL}. Backend-agnostic: all reads go through a [`ResourceLookup`].
#[derive(Clone)]
pub struct OwnershipValidator {
    lookup: Arc<dyn ResourceLookup>,
}

impl OwnershipValidator {
    pub fn new(lookup: Arc<dyn ResourceLookup>) -> Self { Self { lookup } }

    pub async fn validate_create(&self, resource: &Resource, namespace: &str) -> Result<ValidationResult> {
        let result = match resource {
            Resource::VirtualCluster(vc) => {
                self.require_application(&vc.spec.application_service_ref, namespace).await?
            }
            Resource::ServiceAccount(sa) => {
                let owner = sa.spec.application_service_ref.as_str();
                let app = self.require_application(owner, namespace).await?;
                if !app.is_valid() {
                    app
                } else {
                    self.require_owned_by(Kind::VirtualCluster, &sa.spec.cluster_ref, owner, namespace).await?
                }
            }
            Resource::Topic(_) | Resource::ConsumerGroup(_) | Resource::Acl(_) => {
                let owner = resource.owner_ref().unwrap_or("");
                let sa = resource.service_ref().unwrap_or("");
                self.require_owned_by(Kind::ServiceAccount, sa, owner, namespace).await?
            }
            _ => ValidationResult::valid(),
        };
        record("create", resource, &result);
        Ok(result)
    }

    /// Ownership is immutable across updates; every other spec field may change.
    pub fn validate_update(&self, existing: &Resource, proposed: &Resource) -> ValidationResult {
        let result = if existing.kind() != proposed.kind() {
            ValidationResult::invalid(format!(
                "Cannot change resource kind from '{}' to '{}'",
                existing.kind(),
                proposed.kind()
            ))
        } else {
            match (existing.owner_ref(), proposed.owner_ref()) {
                (Some(old), Some(new)) if old == new => ValidationResult::valid(),
                (Some(old), Some(new)) => ValidationResult::invalid(format!(
                    "Cannot change applicationServiceRef from '{}' to '{}'. Only the original owner can modify this resource.",
                    old, new
                )),
                _ => ValidationResult::invalid("Resource must have applicationServiceRef"),
            }
        };
        record("update", proposed, &result);
        result
    }

    /// Plain string comparison against the declared owner; the chain is not walked.
    pub fn validate_delete(&self, resource: &Resource, requesting_owner: &str) -> ValidationResult {
        let owner = resource.owner_ref().unwrap_or("");
        let result = if !owner.is_empty() && owner == requesting_owner {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(format!(
                "ApplicationService '{}' cannot delete resource owned by '{}'",
                requesting_owner, owner
            ))
        };
        record("delete", resource, &result);
        result
    }

    async fn require_application(&self, name: &str, namespace: &str) -> Result<ValidationResult> {
        Ok(match self.lookup.lookup(Kind::ApplicationService, namespace, name).await? {
            Some(_) => ValidationResult::valid(),
            None => ValidationResult::invalid(format!("Referenced ApplicationService '{}' does not exist", name)),
        })
    }

    /// The referenced resource must exist and carry the same owner as the referrer.
    async fn require_owned_by(&self, kind: Kind, name: &str, owner: &str, namespace: &str) -> Result<ValidationResult> {
        let Some(referenced) = self.lookup.lookup(kind, namespace, name).await? else {
            return Ok(ValidationResult::invalid(format!("Referenced {} '{}' does not exist", kind, name)));
        };
        let actual = referenced.owner_ref().unwrap_or("");
        if actual == owner {
            Ok(ValidationResult::valid())
        } else {
            Ok(ValidationResult::invalid(format!("{} '{}' is owned by '{}', not '{}'", kind, name, actual, owner)))
        }
    }
}

fn record(op: &'static str, resource: &Resource, result: &ValidationResult) {
    if result.is_valid() {
        debug!(op, key = %resource.key(), "ownership check passed");
    } else {
        counter!("ownership_denials_total", 1u64, "op" => op, "kind" => resource.kind().as_str());
        debug!(op, key = %resource.key(), reason = ?result.message(), "ownership check failed");
    }
}
