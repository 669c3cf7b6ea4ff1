use std::fmt;

use chrono::{DateTime, Utc};
use conduit_core::{Kind, ObjectKey};
use conduit_schema::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Result carried by AFTER events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    ValidationError,
    Conflict,
    NotFound,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "BEFORE",
            Phase::After => "AFTER",
        }
    }
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::ValidationError => "VALIDATION_ERROR",
            Outcome::Conflict => "CONFLICT",
            Outcome::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Immutable record of one step around a reconcile or guarded store write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileEvent {
    pub phase: Phase,
    pub operation: Operation,
    pub kind: Kind,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl ReconcileEvent {
    pub fn before(operation: Operation, key: &ObjectKey, application: Option<&str>) -> Self {
        Self {
            phase: Phase::Before,
            operation,
            kind: key.kind,
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            application: application.map(str::to_string),
            timestamp: Utc::now(),
            result: None,
            message: None,
            reason: None,
            resource_version: None,
            error_details: None,
        }
    }

    pub fn after(
        operation: Operation,
        key: &ObjectKey,
        application: Option<&str>,
        result: Outcome,
        message: impl Into<String>,
    ) -> Self {
        let mut ev = Self::before(operation, key, application);
        ev.phase = Phase::After;
        ev.result = Some(result);
        ev.message = Some(message.into());
        ev
    }

    /// BEFORE event for a resource, carrying its version when it has one.
    pub fn started(operation: Operation, resource: &Resource) -> Self {
        let mut ev = Self::before(operation, &resource.key(), resource.application());
        ev.resource_version = resource.resource_version().map(str::to_string);
        ev
    }

    pub fn finished(operation: Operation, resource: &Resource, result: Outcome, message: impl Into<String>) -> Self {
        let mut ev = Self::after(operation, &resource.key(), resource.application(), result, message);
        ev.resource_version = resource.resource_version().map(str::to_string);
        ev
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn with_resource_version(mut self, rv: impl Into<String>) -> Self {
        self.resource_version = Some(rv.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, self.namespace.clone(), self.name.clone())
    }

    pub fn is_success(&self) -> bool { self.result == Some(Outcome::Success) }
}

impl fmt::Display for ReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}/{}/{}", self.phase, self.operation, self.kind, self.namespace, self.name)?;
        if let Some(app) = &self.application {
            write!(f, " (owner: {})", app)?;
        }
        if let Some(result) = self.result {
            write!(f, " - {}", result)?;
        }
        if let Some(rv) = &self.resource_version {
            write!(f, " [v{}]", rv)?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_audit_format() {
        let key = ObjectKey::new(Kind::Topic, "ns", "t1");
        let before = ReconcileEvent::before(Operation::Create, &key, Some("app1"));
        assert_eq!(before.to_string(), "BEFORE CREATE Topic/ns/t1 (owner: app1)");

        let after = ReconcileEvent::after(Operation::Update, &key, None, Outcome::ValidationError, "denied")
            .with_resource_version("7");
        assert_eq!(after.to_string(), "AFTER UPDATE Topic/ns/t1 - VALIDATION_ERROR [v7]: denied");
        assert!(!after.is_success());
        assert_eq!(after.key(), key);
    }

    #[test]
    fn serializes_camel_case() {
        let key = ObjectKey::new(Kind::Acl, "ns", "a1");
        let ev = ReconcileEvent::after(Operation::Delete, &key, Some("app1"), Outcome::NotFound, "gone")
            .with_error_details("trace");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "ACL");
        assert_eq!(v["result"], "NOT_FOUND");
        assert_eq!(v["errorDetails"], "trace");
        assert!(v.get("reason").is_none());
    }
}
