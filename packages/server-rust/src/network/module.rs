//! HTTP transport adapter with deferred startup.
//!
//! `new()` allocates the module, `add_route()` binds pipelines to
//! (method, path) pairs, `start()` binds the TCP listener and `serve()`
//! accepts connections until shutdown. Routes can be registered any time
//! before `serve()`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Request};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{self, MethodFilter, MethodRouter};
use axum::{Json, Router};
use stagehand_core::{ApiStatus, EnvContext, ResponseEnvelope};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::config::NetworkConfig;
use super::middleware::build_http_layers;
use crate::pipeline::stages::inbound_correlation;
use crate::pipeline::{BusinessService, Pipeline, PipelineConfig, Reply, RequestParts};

/// Why a route could not be registered.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route {method} {path} is already registered")]
    Duplicate { method: Method, path: String },
    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
    #[error("route {method} {path} has an invalid pipeline configuration")]
    InvalidConfig { method: Method, path: String },
}

struct RouteEntry {
    path: String,
    filter: MethodFilter,
    pipeline: Arc<Pipeline>,
}

/// Serves pipelines over HTTP with axum.
///
/// Every route gets its own immutable [`Pipeline`]; requests to the same
/// route share it and run concurrently.
pub struct HttpModule {
    config: NetworkConfig,
    env: EnvContext,
    routes: Vec<RouteEntry>,
    registered: HashSet<(Method, String)>,
    listener: Option<TcpListener>,
}

impl HttpModule {
    /// Creates a module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            env: EnvContext::global(),
            routes: Vec::new(),
            registered: HashSet::new(),
            listener: None,
        }
    }

    /// Environment passed to every route's runtime context.
    #[must_use]
    pub fn with_env(mut self, env: EnvContext) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Binds `service`, wrapped in the pipeline `config` describes, to
    /// `method` and `path`.
    ///
    /// Paths use axum syntax; captures such as `/orders/{id}` become path
    /// parameters for the `input_params` binder.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] for a duplicate (method, path), a method axum
    /// cannot route, or a config that fails [`PipelineConfig::is_valid`].
    pub fn add_route(
        &mut self,
        method: Method,
        path: &str,
        config: &PipelineConfig,
        service: impl BusinessService + 'static,
    ) -> Result<(), RouteError> {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RouteError::UnsupportedMethod(method.clone()))?;
        if !config.is_valid() {
            return Err(RouteError::InvalidConfig {
                method,
                path: path.to_string(),
            });
        }
        if !self.registered.insert((method.clone(), path.to_string())) {
            return Err(RouteError::Duplicate {
                method,
                path: path.to_string(),
            });
        }

        let pipeline = Pipeline::new(config, service)
            .with_env(self.env.clone())
            .with_route(format!("{method} {path}"));
        debug!(route = %format!("{method} {path}"), stages = ?pipeline.stage_names(), "route registered");

        self.routes.push(RouteEntry {
            path: path.to_string(),
            filter,
            pipeline: Arc::new(pipeline),
        });
        Ok(())
    }

    /// Assembles the axum router with every registered route and the HTTP
    /// middleware stack. Unknown paths answer with a 404 envelope.
    pub fn build_router(&self) -> Router {
        let mut by_path: BTreeMap<&str, MethodRouter> = BTreeMap::new();
        for route in &self.routes {
            let pipeline = Arc::clone(&route.pipeline);
            let body_limit = self.config.body_limit;
            let handler = move |request: Request| {
                let pipeline = Arc::clone(&pipeline);
                async move { dispatch(&pipeline, request, body_limit).await }
            };
            let method_router = match by_path.remove(route.path.as_str()) {
                Some(existing) => existing.on(route.filter, handler),
                None => routing::on(route.filter, handler),
            };
            by_path.insert(&route.path, method_router);
        }

        let router = by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(path, method_router)
            });

        router
            .fallback(unknown_route)
            .layer(build_http_layers(&self.config))
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then lets in-flight
    /// requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();

        info!(routes = self.routes.len(), "Serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Collects the axum request into [`RequestParts`] and runs the pipeline.
async fn dispatch(pipeline: &Pipeline, request: Request, body_limit: usize) -> Response {
    let (mut parts, body) = request.into_parts();

    let path_params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();

    let body = axum::body::to_bytes(body, body_limit)
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, limit = body_limit, "Request body unreadable, treating as empty");
            Bytes::new()
        });

    let request = RequestParts {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        path_params,
        body,
    };
    pipeline.execute(request).await.into_response()
}

async fn unknown_route(request: Request) -> Response {
    let log = inbound_correlation(request.headers());
    debug!(corr_id = %log.corr_id(), uri = %request.uri(), "no route matched");
    Reply {
        status: StatusCode::NOT_FOUND,
        envelope: ResponseEnvelope::failure(
            ApiStatus::UnknownItemRequested,
            "Unknown endpoint",
            &format!("No route for {} {}", request.method(), request.uri().path()),
            log.corr_id(),
        ),
    }
    .into_response()
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let corr_id = HeaderValue::from_str(self.corr_id()).ok();
        let mut response = (self.status, Json(self.envelope)).into_response();
        if let Some(value) = corr_id {
            response
                .headers_mut()
                .insert(HeaderName::from_static("x-correlation-id"), value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use stagehand_core::{BusinessOutcome, RuntimeContext};

    use super::*;
    use crate::pipeline::ServiceInput;

    async fn ping(_rt: RuntimeContext, _input: ServiceInput) -> BusinessOutcome {
        BusinessOutcome::ok("pong")
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = HttpModule::new(NetworkConfig::default());
        assert!(module.listener.is_none());
        assert_eq!(module.route_count(), 0);
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut module = HttpModule::new(NetworkConfig::default());
        let config = PipelineConfig::default();
        module.add_route(Method::GET, "/ping", &config, ping).unwrap();
        module.add_route(Method::POST, "/ping", &config, ping).unwrap();

        let err = module
            .add_route(Method::GET, "/ping", &config, ping)
            .unwrap_err();
        assert!(matches!(err, RouteError::Duplicate { .. }));
        assert_eq!(err.to_string(), "route GET /ping is already registered");
        assert_eq!(module.route_count(), 2);
    }

    #[test]
    fn unroutable_method_is_rejected() {
        let mut module = HttpModule::new(NetworkConfig::default());
        let method = Method::from_bytes(b"PURGE").unwrap();
        let err = module
            .add_route(method, "/cache", &PipelineConfig::default(), ping)
            .unwrap_err();
        assert!(matches!(err, RouteError::UnsupportedMethod(_)));
    }

    #[test]
    fn build_router_merges_methods_on_one_path() {
        let mut module = HttpModule::new(NetworkConfig::default());
        let config = PipelineConfig::default();
        module.add_route(Method::GET, "/orders/{id}", &config, ping).unwrap();
        module.add_route(Method::DELETE, "/orders/{id}", &config, ping).unwrap();
        let _router = module.build_router();
    }

    #[test]
    fn reply_carries_correlation_header() {
        let reply = Reply {
            status: StatusCode::CONFLICT,
            envelope: ResponseEnvelope::failure(ApiStatus::EntityAlreadyExists, "dup", "sku", "c-5"),
        };
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()["x-correlation-id"], "c-5");
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = HttpModule::new(NetworkConfig {
            host: "127.0.0.1".to_string(),
            ..NetworkConfig::default()
        });
        let port = module.start().await.unwrap();
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_requires_start() {
        let module = HttpModule::new(NetworkConfig::default());
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert_eq!(err.to_string(), "start() must be called before serve()");
    }

    #[tokio::test]
    async fn serve_returns_after_shutdown() {
        let mut module = HttpModule::new(NetworkConfig {
            host: "127.0.0.1".to_string(),
            ..NetworkConfig::default()
        });
        module.start().await.unwrap();
        module.serve(async {}).await.unwrap();
    }
}
