//! Custom resource definitions, one per kind.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::policy::PolicyType;

/// Root of the ownership chain.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "ApplicationService",
    plural = "applicationservices",
    shortname = "appsvc",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"App","type":"string","jsonPath":".spec.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationServiceSpec {
    pub name: String,
}

/// How clients authenticate against a virtual cluster.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    #[serde(rename = "MTLS")]
    Mtls,
    #[serde(rename = "SASL_SSL")]
    SaslSsl,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "VirtualCluster",
    plural = "virtualclusters",
    shortname = "vc",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterId"}"#,
    printcolumn = r#"{"name":"Owner","type":"string","jsonPath":".spec.applicationServiceRef"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualClusterSpec {
    /// Identifier of the virtual cluster on the gateway.
    pub cluster_id: String,
    pub application_service_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "ServiceAccount",
    plural = "serviceaccounts",
    shortname = "msa",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef"}"#,
    printcolumn = r#"{"name":"Owner","type":"string","jsonPath":".spec.applicationServiceRef"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    pub name: String,
    /// Certificate subjects, e.g. `CN=orders,OU=team,O=corp`.
    #[serde(default)]
    pub dn: Vec<String>,
    pub cluster_ref: String,
    pub application_service_ref: String,
}

fn default_partitions() -> i32 { 6 }
fn default_replication_factor() -> i32 { 3 }

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "Topic",
    plural = "topics",
    shortname = "mtopic",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Topic","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Partitions","type":"integer","jsonPath":".spec.partitions"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    /// Name of the ServiceAccount this topic belongs to.
    pub service_ref: String,
    #[schemars(length(min = 1, max = 249), regex(pattern = r"^[a-zA-Z0-9._-]+$"))]
    pub name: String,
    #[serde(default = "default_partitions")]
    #[schemars(range(min = 1, max = 1000))]
    pub partitions: i32,
    #[serde(default = "default_replication_factor")]
    #[schemars(range(min = 1, max = 5))]
    pub replication_factor: i32,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    pub application_service_ref: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternType {
    #[default]
    Literal,
    Prefixed,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "ConsumerGroup",
    plural = "consumergroups",
    shortname = "mcg",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupSpec {
    pub service_ref: String,
    pub name: String,
    #[serde(default)]
    pub pattern_type: PatternType,
    pub application_service_ref: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclOperation {
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    ClusterAction,
    DescribeConfigs,
    AlterConfigs,
    IdempotentWrite,
    All,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AclPermission {
    #[default]
    Allow,
    Deny,
}

fn default_host() -> String { "*".to_string() }

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "ACL",
    root = "Acl",
    plural = "acls",
    shortname = "macl",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AclSpec {
    pub service_ref: String,
    /// Mutually exclusive with `consumerGroupRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group_ref: Option<String>,
    pub operations: Vec<AclOperation>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub permission: AclPermission,
    pub application_service_ref: String,
}

/// Where a gateway policy applies. Every axis is optional.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "Scope",
    plural = "scopes",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpec {
    pub application_service_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_ref: Option<String>,
    /// Literal group name, not a resource reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<String>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "GatewayPolicy",
    plural = "gatewaypolicies",
    shortname = "gwp",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Policy","type":"string","jsonPath":".spec.policyType"}"#,
    printcolumn = r#"{"name":"Priority","type":"integer","jsonPath":".spec.priority"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPolicySpec {
    pub application_service_ref: String,
    pub scope_ref: String,
    pub policy_type: PolicyType,
    pub priority: i32,
    /// Plugin configuration passed through to the gateway untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
}

fn preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    let mut obj = SchemaObject { instance_type: Some(InstanceType::Object.into()), ..Default::default() };
    obj.extensions.insert("x-kubernetes-preserve-unknown-fields".to_string(), serde_json::Value::Bool(true));
    Schema::Object(obj)
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredTopic {
    #[schemars(length(min = 1, max = 249), regex(pattern = r"^[a-zA-Z0-9._-]+$"))]
    pub name: String,
    #[serde(default = "default_partitions")]
    #[schemars(range(min = 1, max = 1000))]
    pub partitions: i32,
    #[serde(default = "default_replication_factor")]
    #[schemars(range(min = 1, max = 5))]
    pub replication_factor: i32,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredAcl {
    #[schemars(regex(pattern = r"^[a-zA-Z0-9._-]+$"))]
    pub topic: String,
    pub operations: Vec<AclOperation>,
}

/// All-in-one declaration of a service's topics and ACLs.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "messaging.example.com",
    version = "v1",
    kind = "MessagingDeclaration",
    plural = "messagingdeclarations",
    shortname = "mdecl",
    namespaced,
    derive = "PartialEq",
    status = "MessagingDeclarationStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MessagingDeclarationSpec {
    #[schemars(length(max = 63), regex(pattern = r"^[a-z0-9][a-z0-9-]*[a-z0-9]$"))]
    pub service_name: String,
    #[schemars(length(max = 100))]
    pub virtual_cluster_id: String,
    #[serde(default)]
    pub topics: Vec<DeclaredTopic>,
    #[serde(default)]
    pub acls: Vec<DeclaredAcl>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeclarationState {
    #[default]
    Pending,
    Claiming,
    Creating,
    Ready,
    Conflict,
    Error,
    Waiting,
    Deleting,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagingDeclarationStatus {
    #[serde(default)]
    pub state: DeclarationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub owned_topics: Vec<String>,
    #[serde(default)]
    pub referenced_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<DeclarationCondition>,
}
