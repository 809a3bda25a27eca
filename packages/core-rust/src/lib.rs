//! Stagehand Core: transport-free building blocks of a request pipeline:
//! the outcome taxonomy and response envelope, tenant identity, correlation
//! context, transaction handles, and the runtime context given to business
//! code.

pub mod correlation;
pub mod env;
pub mod outcome;
pub mod runtime;
pub mod tenant;
pub mod transaction;

pub use correlation::{CorrelationContext, LogField};
pub use env::EnvContext;
pub use outcome::{ApiStatus, BusinessOutcome, ErrorModel, ResponseEnvelope};
pub use runtime::RuntimeContext;
pub use tenant::TenantIdentity;
pub use transaction::{
    Transaction, TransactionError, TransactionHandle, TransactionSource, TransactionState,
};
