use std::time::Instant;

use conduit_core::Kind;
use conduit_schema::{Resource, DEFAULT_NAMESPACE};
use conduit_validate::OwnershipValidator;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::review::{AdmissionOperation, AdmissionRequest, AdmissionResponse};

/// Turns admission requests into allow/deny decisions. Stateless per request.
pub struct AdmissionHandler {
    validator: OwnershipValidator,
}

fn decode(kind: Kind, value: &Value) -> Result<Resource, String> {
    Resource::from_value(kind, value.clone()).map_err(|e| e.to_string())
}

impl AdmissionHandler {
    pub fn new(validator: OwnershipValidator) -> Self { Self { validator } }

    /// Decide on one request. Every failure becomes a denial carrying its text; the
    /// response always echoes the request uid.
    pub async fn review(&self, kind: Kind, req: &AdmissionRequest) -> AdmissionResponse {
        let t0 = Instant::now();
        let resp = match req.operation {
            AdmissionOperation::Create => self.create(kind, req).await,
            AdmissionOperation::Update => self.update(kind, req),
            AdmissionOperation::Delete => self.delete(kind, req),
            AdmissionOperation::Connect | AdmissionOperation::Unknown => {
                debug!(%kind, uid = %req.uid, op = ?req.operation, "operation not guarded; allowing");
                AdmissionResponse::allow(&req.uid)
            }
        };
        histogram!("admission_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!(
            "admission_requests_total",
            1u64,
            "kind" => kind.as_str(),
            "allowed" => if resp.allowed { "true" } else { "false" }
        );
        if resp.allowed {
            debug!(%kind, uid = %req.uid, ns = ?req.namespace, name = ?req.name, op = ?req.operation, "admitted");
        } else {
            info!(
                %kind,
                uid = %req.uid,
                ns = ?req.namespace,
                name = ?req.name,
                op = ?req.operation,
                reason = resp.message().unwrap_or_default(),
                "denied"
            );
        }
        resp
    }

    /// Request namespace, else the object's own, else the default namespace.
    fn namespace<'a>(req: &'a AdmissionRequest, resource: &'a Resource) -> &'a str {
        req.namespace
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| resource.namespace().filter(|s| !s.is_empty()))
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    async fn create(&self, kind: Kind, req: &AdmissionRequest) -> AdmissionResponse {
        let Some(obj) = &req.object else {
            return AdmissionResponse::deny(&req.uid, "Missing object");
        };
        let resource = match decode(kind, obj) {
            Ok(r) => r,
            Err(e) => return AdmissionResponse::deny(&req.uid, format!("Failed to validate create: {}", e)),
        };
        let ns = Self::namespace(req, &resource);
        match self.validator.validate_create(&resource, ns).await {
            Ok(v) if v.is_valid() => AdmissionResponse::allow(&req.uid),
            Ok(v) => AdmissionResponse::deny(&req.uid, v.message().unwrap_or("Validation failed")),
            Err(e) => {
                warn!(%kind, ns, name = resource.name(), error = %e, "validation lookup failed");
                AdmissionResponse::deny(&req.uid, format!("Internal validation error: {}", e))
            }
        }
    }

    fn update(&self, kind: Kind, req: &AdmissionRequest) -> AdmissionResponse {
        let (Some(obj), Some(old)) = (&req.object, &req.old_object) else {
            return AdmissionResponse::deny(&req.uid, "Missing object");
        };
        let decoded = decode(kind, old).and_then(|old| decode(kind, obj).map(|new| (old, new)));
        match decoded {
            Ok((existing, proposed)) => {
                let v = self.validator.validate_update(&existing, &proposed);
                if v.is_valid() {
                    AdmissionResponse::allow(&req.uid)
                } else {
                    AdmissionResponse::deny(&req.uid, v.message().unwrap_or("Validation failed"))
                }
            }
            Err(e) => AdmissionResponse::deny(&req.uid, format!("Failed to validate update: {}", e)),
        }
    }

    /// Deletes are not checked against ownership; the platform's access control decides.
    fn delete(&self, kind: Kind, req: &AdmissionRequest) -> AdmissionResponse {
        let Some(old) = &req.old_object else {
            return AdmissionResponse::deny(&req.uid, "Resource not found");
        };
        match decode(kind, old) {
            Ok(resource) => {
                info!(
                    %kind,
                    ns = Self::namespace(req, &resource),
                    name = resource.name(),
                    owner = ?resource.owner_ref(),
                    user = ?req.user_info.username,
                    groups = ?req.user_info.groups,
                    "delete admitted; ownership left to platform access control"
                );
                AdmissionResponse::allow(&req.uid)
            }
            Err(e) => AdmissionResponse::deny(&req.uid, format!("Failed to validate delete: {}", e)),
        }
    }
}
