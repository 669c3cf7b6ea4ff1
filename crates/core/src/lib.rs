//! Conduit core types: resource kinds, object keys, validation outcomes and errors.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;

pub use error::{ConduitError, Result};

/// API group every custom resource kind is served under.
pub const API_GROUP: &str = "messaging.example.com";
pub const API_VERSION: &str = "v1";

/// Closed set of resource kinds the operator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    ApplicationService,
    VirtualCluster,
    ServiceAccount,
    Topic,
    ConsumerGroup,
    #[serde(rename = "ACL")]
    Acl,
    Scope,
    GatewayPolicy,
    MessagingDeclaration,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::ApplicationService,
        Kind::VirtualCluster,
        Kind::ServiceAccount,
        Kind::Topic,
        Kind::ConsumerGroup,
        Kind::Acl,
        Kind::Scope,
        Kind::GatewayPolicy,
        Kind::MessagingDeclaration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ApplicationService => "ApplicationService",
            Kind::VirtualCluster => "VirtualCluster",
            Kind::ServiceAccount => "ServiceAccount",
            Kind::Topic => "Topic",
            Kind::ConsumerGroup => "ConsumerGroup",
            Kind::Acl => "ACL",
            Kind::Scope => "Scope",
            Kind::GatewayPolicy => "GatewayPolicy",
            Kind::MessagingDeclaration => "MessagingDeclaration",
        }
    }

    /// Lower-case plural used in API paths and admission routes.
    pub fn plural(&self) -> &'static str {
        match self {
            Kind::ApplicationService => "applicationservices",
            Kind::VirtualCluster => "virtualclusters",
            Kind::ServiceAccount => "serviceaccounts",
            Kind::Topic => "topics",
            Kind::ConsumerGroup => "consumergroups",
            Kind::Acl => "acls",
            Kind::Scope => "scopes",
            Kind::GatewayPolicy => "gatewaypolicies",
            Kind::MessagingDeclaration => "messagingdeclarations",
        }
    }

    pub fn from_plural(s: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|k| k.plural() == s)
    }

    /// Admission path segment: the plural, or the lower-case singular (`topic`, `acl`).
    pub fn from_route(s: &str) -> Option<Kind> {
        Kind::from_plural(s).or_else(|| Kind::ALL.into_iter().find(|k| k.as_str().to_ascii_lowercase() == s))
    }

    /// Whether resources of this kind carry an `applicationServiceRef`.
    pub fn has_owner(&self) -> bool {
        !matches!(self, Kind::ApplicationService | Kind::MessagingDeclaration)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ConduitError;

    fn from_str(s: &str) -> Result<Self> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s) || k.plural() == s)
            .ok_or_else(|| ConduitError::Protocol(format!("unknown resource kind: {}", s)))
    }
}

/// Identity of a stored resource: `(kind, namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Outcome of an ownership check. Invalid results always carry a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self { Self { valid: true, message: None } }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, message: Some(message.into()) }
    }

    pub fn is_valid(&self) -> bool { self.valid }

    pub fn message(&self) -> Option<&str> { self.message.as_deref() }
}
