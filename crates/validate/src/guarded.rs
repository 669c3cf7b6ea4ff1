use std::sync::Arc;

use conduit_core::{ConduitError, Kind, ObjectKey, Result, ValidationResult};
use conduit_events::{EventPublisher, Operation, Outcome, ReconcileEvent};
use conduit_schema::Resource;
use conduit_store::ResourceStore;
use tracing::info;

use crate::OwnershipValidator;

/// Store writes gated by the same ownership rules as admission, with lifecycle events
/// published around each write.
pub struct GuardedStore {
    store: Arc<ResourceStore>,
    validator: OwnershipValidator,
    events: EventPublisher,
}

impl GuardedStore {
    pub fn new(store: Arc<ResourceStore>, validator: OwnershipValidator, events: EventPublisher) -> Self {
        Self { store, validator, events }
    }

    pub fn store(&self) -> &Arc<ResourceStore> { &self.store }

    /// Duplicates are rejected before any ownership check. Kinds without an owner
    /// (the chain root, declarations) skip the checks entirely.
    pub async fn create(&self, namespace: &str, resource: Resource) -> Result<Arc<Resource>> {
        let resource = resource.with_namespace(namespace);
        self.events.publish(ReconcileEvent::started(Operation::Create, &resource));

        let key = resource.key();
        if self.store.get_key(&key).is_some() {
            let e = ConduitError::AlreadyExists(key);
            self.finish(Operation::Create, &resource, Outcome::Conflict, e.to_string());
            return Err(e);
        }

        if resource.kind().has_owner() {
            let verdict = match self.validator.validate_create(&resource, namespace).await {
                Ok(v) => v,
                Err(e) => {
                    self.finish(Operation::Create, &resource, Outcome::Failure, e.to_string());
                    return Err(e);
                }
            };
            if !verdict.is_valid() {
                let msg = verdict.message.unwrap_or_default();
                self.finish(Operation::Create, &resource, Outcome::ValidationError, msg.clone());
                return Err(ConduitError::Validation(msg));
            }
        }

        match self.store.create(namespace, resource.clone()) {
            Ok(stored) => {
                self.finish(Operation::Create, &stored, Outcome::Success, "Resource created");
                info!(key = %stored.key(), "resource created");
                Ok(stored)
            }
            Err(e) => {
                let outcome = if matches!(e, ConduitError::AlreadyExists(_)) { Outcome::Conflict } else { Outcome::Failure };
                self.finish(Operation::Create, &resource, outcome, e.to_string());
                Err(e)
            }
        }
    }

    pub fn update(&self, namespace: &str, name: &str, resource: Resource) -> Result<Arc<Resource>> {
        let mut resource = resource.with_namespace(namespace);
        resource.meta_mut().name = Some(name.to_string());
        self.events.publish(ReconcileEvent::started(Operation::Update, &resource));

        let Some(existing) = self.store.get(resource.kind(), namespace, name) else {
            let key = ObjectKey::new(resource.kind(), namespace, name);
            self.finish(Operation::Update, &resource, Outcome::NotFound, format!("Resource not found: {}", key));
            return Err(ConduitError::NotFound(key));
        };
        let verdict =
            if existing.kind().has_owner() { self.validator.validate_update(&existing, &resource) } else { ValidationResult::valid() };
        if !verdict.is_valid() {
            let msg = verdict.message.unwrap_or_default();
            self.finish(Operation::Update, &resource, Outcome::ValidationError, msg.clone());
            return Err(ConduitError::Validation(msg));
        }

        match self.store.update(namespace, name, resource.clone()) {
            Ok(stored) => {
                self.finish(Operation::Update, &stored, Outcome::Success, "Resource updated");
                Ok(stored)
            }
            Err(e) => {
                let outcome = if matches!(e, ConduitError::NotFound(_)) { Outcome::NotFound } else { Outcome::Failure };
                self.finish(Operation::Update, &resource, outcome, e.to_string());
                Err(e)
            }
        }
    }

    /// Returns `Ok(false)` when nothing is stored under the key. Ownerless kinds are
    /// removed without an owner check.
    pub fn delete(&self, kind: Kind, namespace: &str, name: &str, requesting_owner: &str) -> Result<bool> {
        let key = ObjectKey::new(kind, namespace, name);
        self.events.publish(ReconcileEvent::before(Operation::Delete, &key, Some(requesting_owner)));

        let Some(existing) = self.store.get_key(&key) else {
            self.events.publish(ReconcileEvent::after(
                Operation::Delete,
                &key,
                Some(requesting_owner),
                Outcome::NotFound,
                format!("Resource not found: {}", key),
            ));
            return Ok(false);
        };
        let verdict = if kind.has_owner() {
            self.validator.validate_delete(&existing, requesting_owner)
        } else {
            ValidationResult::valid()
        };
        if !verdict.is_valid() {
            let msg = verdict.message.unwrap_or_default();
            self.finish(Operation::Delete, &existing, Outcome::ValidationError, msg.clone());
            return Err(ConduitError::Validation(msg));
        }

        let removed = self.store.delete(kind, namespace, name);
        let outcome = if removed { Outcome::Success } else { Outcome::NotFound };
        self.finish(Operation::Delete, &existing, outcome, "Resource deleted");
        Ok(removed)
    }

    fn finish(&self, op: Operation, resource: &Resource, outcome: Outcome, message: impl Into<String>) {
        self.events.publish(ReconcileEvent::finished(op, resource, outcome, message));
    }
}
