//! Storage collaborators that open units of work for the pipeline.
//!
//! - [`MemoryStore`]: in-memory transactional key/value store
//! - [`NullTransactionSource`]: transactions without side effects

pub mod memory;
pub mod null;

pub use memory::{MemoryStore, MemoryTransaction};
pub use null::{NullTransaction, NullTransactionSource};
