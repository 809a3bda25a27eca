//! Tenant resolution stages.

use async_trait::async_trait;
use http::StatusCode;
use stagehand_core::{ApiStatus, TenantIdentity};
use tracing::{debug, error};

use crate::pipeline::context::{ExecutionContext, RequestParts};
use crate::pipeline::stage::{Flow, Stage};

/// Inbound header naming the tenant.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// Inbound header naming the user acting within the tenant.
pub const TENANT_USER_ID_HEADER: &str = "X-Tenant-UserID";

/// Reads the tenant identity from the tenant headers.
///
/// Returns `None` unless both headers are present and non-empty.
#[must_use]
pub fn resolve_tenant(request: &RequestParts) -> Option<TenantIdentity> {
    TenantIdentity::new(
        request.header(TENANT_ID_HEADER).unwrap_or_default(),
        request.header(TENANT_USER_ID_HEADER).unwrap_or_default(),
    )
}

/// Always resolves the system tenant (`Global` / `system`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTenantStage;

#[async_trait]
impl Stage for SystemTenantStage {
    fn name(&self) -> &'static str {
        "tenant"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        ctx.tenant.set(TenantIdentity::system());
        Flow::Continue
    }
}

/// Requires `X-Tenant-ID` and `X-Tenant-UserID`; rejects the request with
/// 401 / `AuthFailed` when either is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderTenantStage;

#[async_trait]
impl Stage for HeaderTenantStage {
    fn name(&self) -> &'static str {
        "tenant"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let Some(tenant) = resolve_tenant(ctx.request()) else {
            error!(
                corr_id = %ctx.corr_id(),
                "Rejected request caused by missing tenant information"
            );
            return ctx.abort(
                StatusCode::UNAUTHORIZED,
                ApiStatus::AuthFailed,
                "Failed to get user information",
                "Missing X-Tenant-ID or X-Tenant-UserID headers",
            );
        };

        debug!(corr_id = %ctx.corr_id(), tenant = tenant.id(), user = tenant.user_id(), "tenant resolved");
        ctx.tenant.set(tenant);
        Flow::Continue
    }
}
