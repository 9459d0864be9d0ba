//! Capability probes backing the scoped route gates.
//!
//! DESIGN
//! ======
//! The server decides every capability from the ambient credential, so the
//! identity passed to [`Capability::resolve`] is only used for logging. Each
//! probe reads one boolean field; only a literal JSON `true` grants.
//! Society-scoped probes without a society in the route deny without a
//! request.

use std::sync::Arc;

use serde_json::Value;

use super::segment;
use crate::gate::{Capability, CapabilityKind, RouteParams};
use crate::net::api::ApiClient;
use crate::net::types::{AccountId, ApiResult};

#[cfg(test)]
#[path = "permissions_test.rs"]
mod permissions_test;

pub const ADMIN_CHECK_ENDPOINT: &str = "/admin_check/";

const ADMIN_FIELD: &str = "admin";
const SOCIETY_ADMIN_FIELD: &str = "Society Admin";
const MEMBER_FIELD: &str = "is_member";

#[must_use]
pub fn society_endpoint(society: &str) -> String {
    format!("/Societies/{}/", segment(society))
}

#[must_use]
pub fn society_admin_endpoint(society: &str) -> String {
    format!("/Societies/{}/IsSocietyAdmin/", segment(society))
}

/// True only when `field` holds a JSON boolean `true`.
fn grants(body: &Value, field: &str) -> bool {
    matches!(body.get(field), Some(Value::Bool(true)))
}

/// Site administrator.
pub struct AdminCapability {
    api: ApiClient,
}

impl AdminCapability {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Capability for AdminCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Admin
    }

    async fn resolve(&self, _params: &RouteParams, identity: &AccountId) -> ApiResult<bool> {
        let body: Value = self.api.post(ADMIN_CHECK_ENDPOINT, None).await?;
        let granted = grants(&body, ADMIN_FIELD);
        tracing::debug!(%identity, granted, "admin probe");
        Ok(granted)
    }
}

/// Administrator of the society named in the route.
pub struct SocietyAdminCapability {
    api: ApiClient,
}

impl SocietyAdminCapability {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Capability for SocietyAdminCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::SocietyAdmin
    }

    async fn resolve(&self, params: &RouteParams, identity: &AccountId) -> ApiResult<bool> {
        let Some(society) = params.society() else {
            tracing::debug!(%identity, "society admin probe without society");
            return Ok(false);
        };
        let body: Value = self.api.post(&society_admin_endpoint(society), None).await?;
        let granted = grants(&body, SOCIETY_ADMIN_FIELD);
        tracing::debug!(%identity, society, granted, "society admin probe");
        Ok(granted)
    }
}

/// Member of the society named in the route.
pub struct MembershipCapability {
    api: ApiClient,
}

impl MembershipCapability {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Capability for MembershipCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Member
    }

    async fn resolve(&self, params: &RouteParams, identity: &AccountId) -> ApiResult<bool> {
        let Some(society) = params.society() else {
            tracing::debug!(%identity, "membership probe without society");
            return Ok(false);
        };
        let body: Value = self.api.get(&society_endpoint(society)).await?;
        let granted = grants(&body, MEMBER_FIELD);
        tracing::debug!(%identity, society, granted, "membership probe");
        Ok(granted)
    }
}

/// The probe implementing `kind`.
#[must_use]
pub fn capability(kind: CapabilityKind, api: ApiClient) -> Arc<dyn Capability> {
    match kind {
        CapabilityKind::Admin => Arc::new(AdminCapability::new(api)),
        CapabilityKind::SocietyAdmin => Arc::new(SocietyAdminCapability::new(api)),
        CapabilityKind::Member => Arc::new(MembershipCapability::new(api)),
    }
}
