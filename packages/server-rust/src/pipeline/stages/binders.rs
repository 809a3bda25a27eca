//! Input binders: headers, body, path parameters and query parameters.
//!
//! Each binder is generic over the model it decodes into, so the target type
//! is fixed when the route is configured. Headers and query decoding are
//! lenient (a failure logs and binds `T::default()`); body decoding and
//! path parameters are strict and abort the request.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use stagehand_core::ApiStatus;
use tracing::{trace, warn};

use crate::pipeline::context::{BoundModel, ExecutionContext};
use crate::pipeline::stage::{Flow, Stage};

/// Why an inbound value could not be decoded into its model.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to encode form pairs: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("failed to decode form pairs: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error("failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes request headers into `T`.
///
/// Header names are matched in lowercase. Values go through the same text
/// decoding as query strings, so numeric and boolean fields parse. A
/// repeated header binds its first value.
///
/// # Errors
///
/// Returns [`BindError`] when the headers do not fit `T`.
pub fn decode_headers<T: DeserializeOwned>(headers: &HeaderMap) -> Result<T, BindError> {
    let pairs: Vec<(&str, &str)> = headers
        .keys()
        .filter_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some((name.as_str(), value))
        })
        .collect();
    let encoded = serde_urlencoded::to_string(pairs)?;
    Ok(serde_urlencoded::from_str(&encoded)?)
}

/// Decodes a raw query string into `T`.
///
/// # Errors
///
/// Returns [`BindError`] when the query does not fit `T`.
pub fn decode_query<T: DeserializeOwned>(query: &str) -> Result<T, BindError> {
    Ok(serde_urlencoded::from_str(query)?)
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Binds the request headers into `H`, or `H::default()` when they don't fit.
pub struct HeadersBinder<H> {
    _model: PhantomData<fn() -> H>,
}

impl<H> HeadersBinder<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<H> Default for HeadersBinder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for HeadersBinder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadersBinder")
            .field("model", &std::any::type_name::<H>())
            .finish()
    }
}

#[async_trait]
impl<H> Stage for HeadersBinder<H>
where
    H: DeserializeOwned + Default + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "headers"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let model = decode_headers::<H>(&ctx.request().headers).unwrap_or_else(|err| {
            warn!(corr_id = %ctx.corr_id(), error = %err, "No headers found to be parsed");
            H::default()
        });
        ctx.headers.set(BoundModel::new(model));
        Flow::Continue
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Binds the JSON body into `B`; a malformed body aborts with 400.
pub struct BodyBinder<B> {
    _model: PhantomData<fn() -> B>,
}

impl<B> BodyBinder<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<B> Default for BodyBinder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for BodyBinder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBinder")
            .field("model", &std::any::type_name::<B>())
            .finish()
    }
}

#[async_trait]
impl<B> Stage for BodyBinder<B>
where
    B: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "body"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        match serde_json::from_slice::<B>(&ctx.request().body) {
            Ok(model) => {
                ctx.body.set(BoundModel::new(model));
                Flow::Continue
            }
            Err(err) => {
                warn!(corr_id = %ctx.corr_id(), error = %err, "Failed to decode request payload");
                ctx.abort(
                    StatusCode::BAD_REQUEST,
                    ApiStatus::Unexpected,
                    "API needs a valid payload",
                    &format!("Failed to transform payload model from JSON. {err}"),
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Path parameters
// ---------------------------------------------------------------------------

/// Requires every named path parameter to be present and non-empty.
#[derive(Debug, Clone)]
pub struct PathParamsBinder {
    names: Vec<String>,
}

impl PathParamsBinder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[async_trait]
impl Stage for PathParamsBinder {
    fn name(&self) -> &'static str {
        "path-params"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let mut params = HashMap::with_capacity(self.names.len());
        for name in &self.names {
            match ctx.request().path_params.get(name) {
                Some(value) if !value.is_empty() => {
                    params.insert(name.clone(), value.clone());
                }
                _ => {
                    warn!(corr_id = %ctx.corr_id(), param = %name, "Missing path parameter");
                    return ctx.abort(
                        StatusCode::BAD_REQUEST,
                        ApiStatus::MissingRequiredItem,
                        "Missing part of URL",
                        &format!("Cannot find parameter {name}"),
                    );
                }
            }
        }

        trace!(corr_id = %ctx.corr_id(), ?params, "path parameters bound");
        ctx.path_params.set(params);
        Flow::Continue
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Binds the query string into `Q`, or `Q::default()` when it doesn't fit.
pub struct QueryBinder<Q> {
    _model: PhantomData<fn() -> Q>,
}

impl<Q> QueryBinder<Q> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<Q> Default for QueryBinder<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> fmt::Debug for QueryBinder<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBinder")
            .field("model", &std::any::type_name::<Q>())
            .finish()
    }
}

#[async_trait]
impl<Q> Stage for QueryBinder<Q>
where
    Q: DeserializeOwned + Default + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "query-params"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let query = ctx.request().query().unwrap_or_default();
        let model = decode_query::<Q>(query).unwrap_or_else(|err| {
            warn!(corr_id = %ctx.corr_id(), error = %err, "No query params found to be parsed");
            Q::default()
        });
        ctx.query.set(BoundModel::new(model));
        Flow::Continue
    }
}
