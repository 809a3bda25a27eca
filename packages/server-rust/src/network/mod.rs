//! HTTP transport: configuration, middleware and the axum adapter.

pub mod config;
pub mod middleware;
pub mod module;

pub use config::{NetworkConfig, DEFAULT_BODY_LIMIT};
pub use middleware::build_http_layers;
pub use module::{HttpModule, RouteError};
