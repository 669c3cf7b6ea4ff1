use conduit_core::{Kind, ObjectKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ApiResource;
use kube::Resource as KubeResource;

use crate::kinds::*;

/// Namespace assumed for objects that arrive without one.
pub const DEFAULT_NAMESPACE: &str = "default";

macro_rules! resources {
    ($($variant:ident($ty:ty) => $as_fn:ident;)+) => {
        /// Closed union over every custom resource kind.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Resource {
            $($variant($ty),)+
        }

        impl Resource {
            pub fn kind(&self) -> Kind {
                match self { $(Resource::$variant(_) => Kind::$variant,)+ }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self { $(Resource::$variant(r) => r.meta(),)+ }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self { $(Resource::$variant(r) => r.meta_mut(),)+ }
            }

            /// Decode a wire object (admission payload, watch event) as the given kind.
            pub fn from_value(kind: Kind, value: serde_json::Value) -> serde_json::Result<Self> {
                Ok(match kind { $(Kind::$variant => Resource::$variant(serde_json::from_value(value)?),)+ })
            }

            pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
                match self { $(Resource::$variant(r) => serde_json::to_value(r),)+ }
            }

            $(
                pub fn $as_fn(&self) -> Option<&$ty> {
                    match self { Resource::$variant(r) => Some(r), _ => None }
                }
            )+
        }

        $(
            impl From<$ty> for Resource {
                fn from(r: $ty) -> Self { Resource::$variant(r) }
            }
        )+

        /// Dynamic API descriptor for a kind, for untyped list/watch/get calls.
        pub fn api_resource(kind: Kind) -> ApiResource {
            match kind { $(Kind::$variant => ApiResource::erase::<$ty>(&()),)+ }
        }
    };
}

resources! {
    ApplicationService(ApplicationService) => as_application_service;
    VirtualCluster(VirtualCluster) => as_virtual_cluster;
    ServiceAccount(ServiceAccount) => as_service_account;
    Topic(Topic) => as_topic;
    ConsumerGroup(ConsumerGroup) => as_consumer_group;
    Acl(Acl) => as_acl;
    Scope(Scope) => as_scope;
    GatewayPolicy(GatewayPolicy) => as_gateway_policy;
    MessagingDeclaration(MessagingDeclaration) => as_messaging_declaration;
}

impl Resource {
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.meta_mut().namespace = Some(namespace.to_string());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind(), self.namespace().unwrap_or(DEFAULT_NAMESPACE), self.name())
    }

    /// The declared owning ApplicationService. Blank references count as absent.
    pub fn owner_ref(&self) -> Option<&str> {
        let owner = match self {
            Resource::ApplicationService(_) | Resource::MessagingDeclaration(_) => None,
            Resource::VirtualCluster(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::ServiceAccount(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::Topic(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::ConsumerGroup(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::Acl(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::Scope(r) => Some(r.spec.application_service_ref.as_str()),
            Resource::GatewayPolicy(r) => Some(r.spec.application_service_ref.as_str()),
        };
        owner.filter(|s| !s.trim().is_empty())
    }

    /// Application reported on lifecycle events. The chain root answers for itself.
    pub fn application(&self) -> Option<&str> {
        match self {
            Resource::ApplicationService(r) => Some(r.spec.name.as_str()),
            Resource::MessagingDeclaration(r) => Some(r.spec.service_name.as_str()),
            _ => self.owner_ref(),
        }
    }

    /// Name of the ServiceAccount referenced through `serviceRef`, for kinds that have one.
    pub fn service_ref(&self) -> Option<&str> {
        match self {
            Resource::Topic(r) => Some(r.spec.service_ref.as_str()),
            Resource::ConsumerGroup(r) => Some(r.spec.service_ref.as_str()),
            Resource::Acl(r) => Some(r.spec.service_ref.as_str()),
            _ => None,
        }
    }
}
