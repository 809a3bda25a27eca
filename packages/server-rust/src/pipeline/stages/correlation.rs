//! Correlation (log) stage.

use async_trait::async_trait;
use http::HeaderMap;
use stagehand_core::CorrelationContext;
use tracing::trace;

use crate::pipeline::context::ExecutionContext;
use crate::pipeline::stage::{Flow, Stage};

/// Inbound header carrying the caller's correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation context for an inbound request: the `X-Correlation-ID`
/// value when present and non-empty, a fresh UUID v4 otherwise.
pub(crate) fn inbound_correlation(headers: &HeaderMap) -> CorrelationContext {
    match headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(id) if !id.is_empty() => CorrelationContext::new(id),
        _ => CorrelationContext::generated(),
    }
}

/// Populates the `log` key from `X-Correlation-ID`, generating a UUID v4
/// when the header is missing or empty.
///
/// The request method and path are recorded as correlation extras.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationStage;

#[async_trait]
impl Stage for CorrelationStage {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let request = ctx.request();
        let mut log = inbound_correlation(&request.headers);
        log.add_extra("method", request.method.as_str());
        log.add_extra("path", request.uri.path());

        trace!(corr_id = %log.corr_id(), extras = %log.extras_display(), "correlation context ready");
        ctx.log.set(log);
        Flow::Continue
    }
}
