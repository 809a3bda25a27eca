//! Built-in stages.
//!
//! Policies selected on [`PipelineConfigBuilder`](super::PipelineConfigBuilder)
//! resolve to these; they can also be installed directly as custom stages.

pub mod binders;
pub mod correlation;
pub mod result;
pub mod runtime;
pub mod tenant;
pub mod transaction;

pub use binders::{
    decode_headers, decode_query, BindError, BodyBinder, HeadersBinder, PathParamsBinder,
    QueryBinder,
};
pub use correlation::{CorrelationStage, CORRELATION_ID_HEADER};
pub(crate) use correlation::inbound_correlation;
pub use result::{transport_status, ResultStage};
pub use runtime::{InvokeStage, RuntimeAssemblyStage};
pub use tenant::{
    resolve_tenant, HeaderTenantStage, SystemTenantStage, TENANT_ID_HEADER,
    TENANT_USER_ID_HEADER,
};
pub use transaction::{
    FinalizeTransactionStage, NoTransactionStage, OpenTransactionStage, TransactionMode,
};
