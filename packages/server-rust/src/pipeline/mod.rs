//! Per-route request pipelines.
//!
//! A [`PipelineConfig`] describes which stages a route runs; a [`Pipeline`]
//! binds that config to a business function and executes it per request.

pub mod config;
pub mod context;
pub mod executor;
pub mod service;
pub mod stage;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    LogPolicy, PipelineConfig, PipelineConfigBuilder, TenantPolicy, TransactionPolicy,
};
pub use context::{BoundModel, ExecutionContext, Reply, RequestParts, Slot};
pub use executor::Pipeline;
pub use service::{BusinessService, ServiceInput};
pub use stage::{Flow, FnStage, Stage};
