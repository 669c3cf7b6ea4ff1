//! Resources as the gateway and console command-line tool expects them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const GATEWAY_API_VERSION: &str = "gateway/v2";
pub const CONSOLE_API_VERSION: &str = "kafka/v2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetObject<S> {
    pub api_version: String,
    pub kind: String,
    pub metadata: TargetMetadata,
    pub spec: S,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(rename = "vCluster", default, skip_serializing_if = "Option::is_none")]
    pub v_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<InterceptorScope>,
}

/// Where an interceptor applies. Absent on the metadata means global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterceptorScope {
    #[serde(rename = "vCluster", default, skip_serializing_if = "Option::is_none")]
    pub v_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl InterceptorScope {
    pub fn is_empty(&self) -> bool {
        self.v_cluster.is_none() && self.username.is_none() && self.group.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualClusterSpec {
    pub acl_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    #[serde(rename = "type")]
    pub type_: String,
    pub external_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    pub partitions: i32,
    pub replication_factor: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptorSpec {
    pub plugin_class: String,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
}

pub type GatewayVirtualCluster = TargetObject<VirtualClusterSpec>;
pub type GatewayServiceAccount = TargetObject<ServiceAccountSpec>;
pub type ConsoleTopic = TargetObject<TopicSpec>;
pub type GatewayInterceptor = TargetObject<InterceptorSpec>;

/// Anything the pipeline can hand to the command driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TargetResource {
    VirtualCluster(GatewayVirtualCluster),
    ServiceAccount(GatewayServiceAccount),
    Topic(ConsoleTopic),
    Interceptor(GatewayInterceptor),
}

impl TargetResource {
    pub fn kind(&self) -> &str {
        match self {
            TargetResource::VirtualCluster(t) => &t.kind,
            TargetResource::ServiceAccount(t) => &t.kind,
            TargetResource::Topic(t) => &t.kind,
            TargetResource::Interceptor(t) => &t.kind,
        }
    }

    pub fn metadata(&self) -> &TargetMetadata {
        match self {
            TargetResource::VirtualCluster(t) => &t.metadata,
            TargetResource::ServiceAccount(t) => &t.metadata,
            TargetResource::Topic(t) => &t.metadata,
            TargetResource::Interceptor(t) => &t.metadata,
        }
    }

    pub fn name(&self) -> &str { &self.metadata().name }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
