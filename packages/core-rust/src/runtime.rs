//! Runtime context handed to business code.

use crate::correlation::CorrelationContext;
use crate::env::EnvContext;
use crate::tenant::TenantIdentity;
use crate::transaction::TransactionHandle;

/// Composed, read-only view of one request's correlation, transaction,
/// tenant and environment.
///
/// Built by the pipeline right before the business function runs. Cloning
/// is cheap enough to hand a copy to spawned work; the transaction handle
/// inside is shared, not duplicated.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    log: CorrelationContext,
    transaction: TransactionHandle,
    tenant: TenantIdentity,
    env: EnvContext,
}

impl RuntimeContext {
    /// Context in the `Global` environment.
    #[must_use]
    pub fn new(
        log: CorrelationContext,
        transaction: TransactionHandle,
        tenant: TenantIdentity,
    ) -> Self {
        Self::with_env(log, transaction, tenant, EnvContext::global())
    }

    #[must_use]
    pub fn with_env(
        log: CorrelationContext,
        transaction: TransactionHandle,
        tenant: TenantIdentity,
        env: EnvContext,
    ) -> Self {
        Self {
            log,
            transaction,
            tenant,
            env,
        }
    }

    /// Same context bound to another unit of work.
    #[must_use]
    pub fn with_transaction(&self, transaction: TransactionHandle) -> Self {
        Self {
            transaction,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn log(&self) -> &CorrelationContext {
        &self.log
    }

    #[must_use]
    pub fn corr_id(&self) -> &str {
        self.log.corr_id()
    }

    #[must_use]
    pub fn transaction(&self) -> &TransactionHandle {
        &self.transaction
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantIdentity {
        &self.tenant
    }

    #[must_use]
    pub fn env(&self) -> &EnvContext {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionState;

    #[test]
    fn new_uses_global_env() {
        let ctx = RuntimeContext::new(
            CorrelationContext::new("c-1"),
            TransactionHandle::noop(),
            TenantIdentity::system(),
        );
        assert_eq!(ctx.env().name(), "Global");
        assert_eq!(ctx.corr_id(), "c-1");
        assert!(ctx.tenant().is_system());
    }

    #[test]
    fn with_transaction_keeps_everything_else() {
        let ctx = RuntimeContext::with_env(
            CorrelationContext::new("c-2"),
            TransactionHandle::noop(),
            TenantIdentity::new("acme", "bob").unwrap(),
            EnvContext::new("staging"),
        );

        struct Never;
        #[async_trait::async_trait]
        impl crate::transaction::Transaction for Never {
            async fn commit(&self) -> anyhow::Result<()> {
                Ok(())
            }
            async fn rollback(&self) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let nested = ctx.with_transaction(TransactionHandle::opened(Box::new(Never)));
        assert_eq!(nested.transaction().state(), TransactionState::Open);
        assert_eq!(nested.corr_id(), "c-2");
        assert_eq!(nested.tenant().id(), "acme");
        assert_eq!(nested.env().name(), "staging");
        assert!(ctx.transaction().is_noop());
    }
}
