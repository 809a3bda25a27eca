//! Stagehand Server: per-route request pipelines served over axum.
//!
//! A route is a [`PipelineConfig`] plus a business function. The pipeline
//! resolves correlation, tenant and transaction, binds inputs, calls the
//! business function and maps its outcome to exactly one JSON envelope.

pub mod network;
pub mod pipeline;
pub mod storage;
pub mod telemetry;

pub use network::{HttpModule, NetworkConfig, RouteError};
pub use pipeline::{
    BusinessService, ExecutionContext, Flow, FnStage, LogPolicy, Pipeline, PipelineConfig,
    PipelineConfigBuilder, Reply, RequestParts, ServiceInput, Stage, TenantPolicy,
    TransactionPolicy,
};
pub use storage::{MemoryStore, MemoryTransaction, NullTransactionSource};
pub use telemetry::{init_tracing, LogFormat, LogLevel, TelemetryConfig};
