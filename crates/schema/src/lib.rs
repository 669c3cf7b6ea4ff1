//! Conduit schema: custom resource definitions for the messaging kinds, the closed
//! `Resource` union over them, and CRD rendering for installation.

#![forbid(unsafe_code)]

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

mod kinds;
mod policy;
mod resource;

pub use kinds::*;
pub use policy::PolicyType;
pub use resource::{api_resource, Resource, DEFAULT_NAMESPACE};

/// Every CRD the operator serves, in ownership-chain order.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        ApplicationService::crd(),
        VirtualCluster::crd(),
        ServiceAccount::crd(),
        Topic::crd(),
        ConsumerGroup::crd(),
        Acl::crd(),
        Scope::crd(),
        GatewayPolicy::crd(),
        MessagingDeclaration::crd(),
    ]
}

/// Render all CRDs as one multi-document YAML stream.
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for crd in crds() {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}
