//! No-op [`TransactionSource`] implementation.

use async_trait::async_trait;
use stagehand_core::{Transaction, TransactionSource};

/// Source whose transactions commit and roll back without side effects.
///
/// Useful for routes that want the managed lifecycle (and its logging)
/// without a storage backend, and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransactionSource;

/// Transaction handed out by [`NullTransactionSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransaction;

#[async_trait]
impl Transaction for NullTransaction {
    async fn commit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionSource for NullTransactionSource {
    async fn open_managed(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(NullTransaction))
    }

    async fn open_unmanaged(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(NullTransaction))
    }
}
