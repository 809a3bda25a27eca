//! Pipeline executor.
//!
//! Stages are kept in one ordered list and driven by a loop instead of
//! nested calls. The forward pass runs `before` until a stage aborts; the
//! unwind pass then runs `after` on every stage that started, in reverse.
//!
//! ```text
//! log -> tenant -> transaction -> [headers] -> [body] -> [path-params]
//!     -> [query-params] -> before-hooks -> runtime -> business -> result
//!     -> after-hooks (reversed) -> [transaction-finalize]
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use stagehand_core::{ApiStatus, EnvContext, ResponseEnvelope};
use tracing::{debug, error, info_span, trace, Instrument};

use super::config::PipelineConfig;
use super::context::{ExecutionContext, Reply, RequestParts};
use super::service::BusinessService;
use super::stage::{Flow, Stage};
use super::stages::{InvokeStage, ResultStage, RuntimeAssemblyStage};

/// A route's assembled stage chain around its business function.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    env: EnvContext,
    route: String,
}

impl Pipeline {
    /// Assembles the chain for `config` around `service`.
    #[must_use]
    pub fn new(config: &PipelineConfig, service: impl BusinessService + 'static) -> Self {
        Self::from_service(config, Arc::new(service))
    }

    #[must_use]
    pub fn from_service(config: &PipelineConfig, service: Arc<dyn BusinessService>) -> Self {
        Self {
            stages: assemble(config, service),
            env: EnvContext::global(),
            route: String::new(),
        }
    }

    /// Environment placed in every request's runtime context.
    #[must_use]
    pub fn with_env(mut self, env: EnvContext) -> Self {
        self.env = env;
        self
    }

    /// Route label recorded on the request span.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Stage names in invocation order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    #[must_use]
    pub fn env(&self) -> &EnvContext {
        &self.env
    }

    /// Runs one request through the chain and returns its single reply.
    pub async fn execute(&self, request: RequestParts) -> Reply {
        let span = info_span!(
            "pipeline",
            route = %self.route,
            corr_id = tracing::field::Empty,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let reply = self.dispatch(request).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let span = tracing::Span::current();
            span.record("corr_id", reply.corr_id());
            span.record("status", reply.status.as_u16());
            span.record("duration_ms", duration_ms);

            debug!(
                corr_id = %reply.corr_id(),
                status = reply.status.as_u16(),
                code = %reply.api_status(),
                duration_ms,
                "request complete"
            );
            reply
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: RequestParts) -> Reply {
        let mut ctx = ExecutionContext::new(request, self.env.clone());

        let mut started = 0;
        for stage in &self.stages {
            started += 1;
            trace!(stage = stage.name(), "before");
            if stage.before(&mut ctx).await == Flow::Abort || ctx.is_aborted() {
                ctx.mark_aborted();
                debug!(corr_id = %ctx.corr_id(), stage = stage.name(), "pipeline aborted");
                break;
            }
        }

        for stage in self.stages[..started].iter().rev() {
            trace!(stage = stage.name(), "after");
            stage.after(&mut ctx).await;
        }

        ctx.take_reply().unwrap_or_else(|| {
            error!(corr_id = %ctx.corr_id(), "pipeline finished without writing a response");
            Reply {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                envelope: ResponseEnvelope::failure(
                    ApiStatus::Unexpected,
                    "Request was not handled",
                    "No stage wrote a response",
                    ctx.corr_id(),
                ),
            }
        })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("route", &self.route)
            .field("env", &self.env)
            .field("stages", &self.stage_names())
            .finish()
    }
}

fn assemble(config: &PipelineConfig, service: Arc<dyn BusinessService>) -> Vec<Arc<dyn Stage>> {
    let mut stages: Vec<Arc<dyn Stage>> = vec![
        Arc::clone(&config.log),
        Arc::clone(&config.tenant),
        Arc::clone(&config.transaction),
    ];
    stages.extend(config.headers.iter().cloned());
    stages.extend(config.body.iter().cloned());
    stages.extend(config.path_params.iter().cloned());
    stages.extend(config.query.iter().cloned());
    stages.extend(config.before_hooks.iter().cloned());
    stages.push(Arc::new(RuntimeAssemblyStage));
    stages.push(Arc::new(InvokeStage::new(service)));
    stages.push(Arc::new(ResultStage));
    // Reversed so that their post-work unwinds in declaration order.
    stages.extend(config.after_hooks.iter().rev().cloned());
    stages.extend(config.finalize.iter().cloned());
    stages
}
