//! Request-scoped state shared by the stages of one pipeline run.
//!
//! [`ExecutionContext`] is a typed record: each well-known key is a named
//! [`Slot`] that exactly one designated stage fills. Reading a slot that was
//! never filled means the route was assembled wrong, so it panics instead of
//! handing out a default.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use stagehand_core::{
    ApiStatus, BusinessOutcome, CorrelationContext, EnvContext, ResponseEnvelope, RuntimeContext,
    TenantIdentity, TransactionHandle,
};
use tracing::debug;

use super::stage::Flow;

// ---------------------------------------------------------------------------
// RequestParts
// ---------------------------------------------------------------------------

/// Transport-neutral view of an inbound request.
///
/// The transport adapter fills this in once; stages only read it.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Percent-decoded path parameters captured by the router.
    pub path_params: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestParts {
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            path_params: HashMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw query string, without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// A context key that is written once and read many times.
pub struct Slot<T> {
    key: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    const fn empty(key: &'static str) -> Self {
        Self { key, value: None }
    }

    /// Reads the value.
    ///
    /// # Panics
    ///
    /// Panics if no stage populated this key: the route's pipeline is
    /// missing the stage that owns it.
    #[must_use]
    pub fn get(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => panic!(
                "request context key `{}` read before it was populated. Is the pipeline correct?",
                self.key
            ),
        }
    }

    /// Mutable access, for stages that enrich a value another stage set.
    ///
    /// # Panics
    ///
    /// Panics if no stage populated this key.
    pub fn get_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => panic!(
                "request context key `{}` read before it was populated. Is the pipeline correct?",
                self.key
            ),
        }
    }

    #[must_use]
    pub fn try_get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Populates the key.
    ///
    /// # Panics
    ///
    /// Panics if the key was already populated: two stages claim it.
    pub fn set(&mut self, value: T) {
        assert!(
            self.value.is_none(),
            "request context key `{}` populated twice. Is the pipeline correct?",
            self.key
        );
        self.value = Some(value);
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        self.key
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(self.key).field(&self.value).finish()
    }
}

// ---------------------------------------------------------------------------
// BoundModel
// ---------------------------------------------------------------------------

/// A decoded input model whose concrete type is fixed by the route config.
#[derive(Clone)]
pub struct BoundModel {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl BoundModel {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for BoundModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundModel")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// The single response a pipeline run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub envelope: ResponseEnvelope,
}

impl Reply {
    #[must_use]
    pub fn corr_id(&self) -> &str {
        &self.envelope.error.corr_id
    }

    #[must_use]
    pub fn api_status(&self) -> ApiStatus {
        self.envelope.error.code
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Everything one request's stages read and write.
///
/// Owned by a single pipeline run and dropped once the reply is emitted.
#[derive(Debug)]
pub struct ExecutionContext {
    request: RequestParts,
    env: EnvContext,
    pub log: Slot<CorrelationContext>,
    pub tenant: Slot<TenantIdentity>,
    pub transaction: Slot<TransactionHandle>,
    pub runtime: Slot<RuntimeContext>,
    pub headers: Slot<BoundModel>,
    pub body: Slot<BoundModel>,
    pub path_params: Slot<HashMap<String, String>>,
    pub query: Slot<BoundModel>,
    pub outcome: Slot<BusinessOutcome>,
    aborted: bool,
    reply: Option<Reply>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(request: RequestParts, env: EnvContext) -> Self {
        Self {
            request,
            env,
            log: Slot::empty("log"),
            tenant: Slot::empty("tenant"),
            transaction: Slot::empty("transaction"),
            runtime: Slot::empty("runtime"),
            headers: Slot::empty("headers"),
            body: Slot::empty("body"),
            path_params: Slot::empty("path_params"),
            query: Slot::empty("query"),
            outcome: Slot::empty("outcome"),
            aborted: false,
            reply: None,
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestParts {
        &self.request
    }

    #[must_use]
    pub fn env(&self) -> &EnvContext {
        &self.env
    }

    /// Correlation id of this request, empty until the log stage ran.
    #[must_use]
    pub fn corr_id(&self) -> &str {
        self.log.try_get().map_or("", CorrelationContext::corr_id)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Stops forward progress and stages an error reply.
    ///
    /// Stages call this from `before` (returning the resulting [`Flow`]) or
    /// from `after` during unwind. The reply is dropped if another stage
    /// already wrote one.
    pub fn abort(
        &mut self,
        status: StatusCode,
        api_status: ApiStatus,
        msg: &str,
        dev_msg: &str,
    ) -> Flow {
        self.aborted = true;
        let envelope = ResponseEnvelope::failure(api_status, msg, dev_msg, self.corr_id());
        self.respond(Reply { status, envelope });
        Flow::Abort
    }

    /// Writes the reply unless one is already staged.
    ///
    /// Returns `false` when the write was dropped.
    pub fn respond(&mut self, reply: Reply) -> bool {
        if let Some(existing) = &self.reply {
            debug!(
                corr_id = %existing.corr_id(),
                kept = %existing.status,
                dropped = %reply.status,
                "response already finalized, dropping later write"
            );
            return false;
        }
        self.reply = Some(reply);
        true
    }

    #[must_use]
    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    pub(crate) fn take_reply(&mut self) -> Option<Reply> {
        self.reply.take()
    }
}
