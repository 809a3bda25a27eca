//! Result mapper: business outcome to transport reply.

use async_trait::async_trait;
use http::StatusCode;
use stagehand_core::ApiStatus;
use tracing::{debug, warn};

use crate::pipeline::context::{ExecutionContext, Reply};
use crate::pipeline::stage::Stage;

/// HTTP status for a business outcome status.
#[must_use]
pub const fn transport_status(status: ApiStatus) -> StatusCode {
    match status {
        ApiStatus::NoError => StatusCode::OK,
        ApiStatus::AuthFailed => StatusCode::FORBIDDEN,
        ApiStatus::EntityAlreadyExists => StatusCode::CONFLICT,
        ApiStatus::EntityDoesNotExist => StatusCode::NOT_FOUND,
        ApiStatus::MissingRequiredItem | ApiStatus::UnknownItemRequested => {
            StatusCode::BAD_REQUEST
        }
        ApiStatus::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Writes the reply for the business outcome during unwind.
///
/// No-ops when a deeper stage (transaction finalize) already wrote one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultStage;

#[async_trait]
impl Stage for ResultStage {
    fn name(&self) -> &'static str {
        "result"
    }

    async fn after(&self, ctx: &mut ExecutionContext) {
        if ctx.has_reply() {
            debug!(corr_id = %ctx.corr_id(), "response already written, skipping result mapping");
            return;
        }

        let outcome = ctx.outcome.get();
        let status = transport_status(outcome.status());
        if !outcome.is_success() {
            warn!(
                corr_id = %ctx.corr_id(),
                status = %outcome.status(),
                msg = outcome.message(),
                dev_msg = outcome.detail(),
                "business function failed"
            );
        }

        let envelope = outcome.to_envelope(ctx.corr_id());
        ctx.respond(Reply { status, envelope });
    }
}
