//! Transaction coordinator stages.
//!
//! The open stage sits near the top of the chain and the finalize stage at
//! the very bottom, so finalize's post-work runs first on the way out: the
//! unit of work is settled before the result mapper writes the reply.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use stagehand_core::{ApiStatus, TransactionHandle, TransactionSource};
use tracing::{debug, error, warn};

use crate::pipeline::context::ExecutionContext;
use crate::pipeline::stage::{Flow, Stage};

/// Installs the no-op handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransactionStage;

#[async_trait]
impl Stage for NoTransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        ctx.transaction.set(TransactionHandle::noop());
        Flow::Continue
    }
}

/// Who settles an opened transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// The pipeline commits or rolls back after the business function.
    Managed,
    /// Business code commits or rolls back itself.
    Unmanaged,
}

impl TransactionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens a transaction from the storage collaborator.
///
/// An open failure aborts with 500 / `Unexpected`. In managed mode the
/// post-work rolls back a handle that is still open, which only happens when
/// the chain aborted before the finalize stage started.
pub struct OpenTransactionStage {
    source: Arc<dyn TransactionSource>,
    mode: TransactionMode,
}

impl OpenTransactionStage {
    #[must_use]
    pub fn new(source: Arc<dyn TransactionSource>, mode: TransactionMode) -> Self {
        Self { source, mode }
    }

    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }
}

impl fmt::Debug for OpenTransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenTransactionStage")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for OpenTransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        let opened = match self.mode {
            TransactionMode::Managed => self.source.open_managed().await,
            TransactionMode::Unmanaged => self.source.open_unmanaged().await,
        };

        match opened {
            Ok(tx) => {
                debug!(corr_id = %ctx.corr_id(), mode = %self.mode, "transaction opened");
                ctx.transaction.set(TransactionHandle::opened(tx));
                Flow::Continue
            }
            Err(err) => {
                error!(
                    corr_id = %ctx.corr_id(),
                    mode = %self.mode,
                    error = %format!("{err:#}"),
                    "Failed to open transaction"
                );
                ctx.abort(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiStatus::Unexpected,
                    &format!("Failed to open new {} transaction", self.mode),
                    &format!("{err:#}"),
                )
            }
        }
    }

    async fn after(&self, ctx: &mut ExecutionContext) {
        if self.mode != TransactionMode::Managed {
            return;
        }
        let Some(handle) = ctx.transaction.try_get().cloned() else {
            return;
        };
        if !handle.is_open() {
            return;
        }

        warn!(
            corr_id = %ctx.corr_id(),
            "request ended before the managed transaction was finalized, rolling back"
        );
        if let Err(err) = handle.rollback().await {
            error!(corr_id = %ctx.corr_id(), error = %err, "Failed to rollback abandoned transaction");
        }
    }
}

/// Settles a managed transaction once the business outcome is known.
///
/// Commits on `NoError`, rolls back otherwise. A failing commit or rollback
/// aborts with 500 / `Unexpected`; that reply is written before the result
/// mapper's, so it wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinalizeTransactionStage;

#[async_trait]
impl Stage for FinalizeTransactionStage {
    fn name(&self) -> &'static str {
        "transaction-finalize"
    }

    async fn after(&self, ctx: &mut ExecutionContext) {
        let handle = ctx.transaction.get().clone();
        let success = ctx.outcome.get().is_success();

        let (result, msg) = if success {
            (handle.commit().await, "Failed to commit changes")
        } else {
            (handle.rollback().await, "Failed to rollback changes")
        };

        match result {
            Ok(()) => debug!(corr_id = %ctx.corr_id(), state = %handle.state(), "transaction finalized"),
            Err(err) => {
                error!(corr_id = %ctx.corr_id(), error = %err, "{msg}");
                ctx.abort(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiStatus::Unexpected,
                    msg,
                    &err.to_string(),
                );
            }
        }
    }
}
