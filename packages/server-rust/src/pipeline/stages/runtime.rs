//! Runtime assembly and business invocation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use stagehand_core::RuntimeContext;
use tracing::debug;

use crate::pipeline::context::ExecutionContext;
use crate::pipeline::service::{BusinessService, ServiceInput};
use crate::pipeline::stage::{Flow, Stage};

/// Composes correlation, transaction, tenant and environment into the
/// [`RuntimeContext`] handed to business code.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeAssemblyStage;

#[async_trait]
impl Stage for RuntimeAssemblyStage {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let runtime = RuntimeContext::with_env(
            ctx.log.get().clone(),
            ctx.transaction.get().clone(),
            ctx.tenant.get().clone(),
            ctx.env().clone(),
        );
        ctx.runtime.set(runtime);
        Flow::Continue
    }
}

/// Calls the route's business function and stores its outcome.
pub struct InvokeStage {
    service: Arc<dyn BusinessService>,
}

impl InvokeStage {
    #[must_use]
    pub fn new(service: Arc<dyn BusinessService>) -> Self {
        Self { service }
    }
}

impl fmt::Debug for InvokeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for InvokeStage {
    fn name(&self) -> &'static str {
        "business"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let runtime = ctx.runtime.get().clone();
        let input = ServiceInput::from_context(ctx);

        let outcome = self.service.call(runtime, input).await;
        debug!(corr_id = %ctx.corr_id(), status = %outcome.status(), "business function returned");

        ctx.outcome.set(outcome);
        Flow::Continue
    }
}
