//! Unit-of-work contracts and the request-scoped transaction handle.
//!
//! Storage backends implement [`Transaction`] and [`TransactionSource`].
//! The pipeline wraps every opened transaction in a [`TransactionHandle`],
//! which enforces the forward-only lifecycle:
//!
//! ```text
//! NotStarted -> Open -> Finalizing -> Committed
//!                                 \-> RolledBack
//! ```
//!
//! `Finalizing` is held while the backend commit or rollback is in flight,
//! so concurrent callers sharing a handle cannot finalize it twice.
//!
//! Routes without transactional needs get [`TransactionHandle::noop`],
//! which stays in the `NoOp` pseudo-state and accepts every call.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Backend contracts
// ---------------------------------------------------------------------------

/// A unit of work opened by a storage backend.
#[async_trait]
pub trait Transaction: Send + Sync + 'static {
    /// Make all changes of this unit of work durable.
    async fn commit(&self) -> anyhow::Result<()>;

    /// Discard all changes of this unit of work.
    async fn rollback(&self) -> anyhow::Result<()>;

    /// Backend-specific handle (connection, session) for business code.
    ///
    /// `None` when the backend exposes nothing.
    fn reference(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }
}

/// Storage collaborator able to open units of work.
///
/// Managed transactions are finalized by the pipeline; unmanaged ones are
/// left to business code. Backends may treat both the same way.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Open a unit of work the pipeline will commit or roll back.
    async fn open_managed(&self) -> anyhow::Result<Box<dyn Transaction>>;

    /// Open a unit of work owned by business code.
    async fn open_unmanaged(&self) -> anyhow::Result<Box<dyn Transaction>>;
}

// ---------------------------------------------------------------------------
// TransactionState
// ---------------------------------------------------------------------------

/// Lifecycle position of a [`TransactionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Open,
    /// A commit or rollback is running against the backend.
    Finalizing,
    Committed,
    RolledBack,
    /// Pseudo-state of the no-op handle: every call succeeds, nothing moves.
    NoOp,
}

impl TransactionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Open => "open",
            Self::Finalizing => "finalizing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::NoOp => "no_op",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by [`TransactionHandle`] operations.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("cannot {operation} a transaction that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TransactionState,
    },
    #[error("commit failed: {0:#}")]
    Commit(#[source] anyhow::Error),
    #[error("rollback failed: {0:#}")]
    Rollback(#[source] anyhow::Error),
}

// ---------------------------------------------------------------------------
// TransactionHandle
// ---------------------------------------------------------------------------

enum Backend {
    NoOp,
    Real(Box<dyn Transaction>),
}

struct HandleInner {
    backend: Backend,
    state: Mutex<TransactionState>,
}

/// Shared, state-tracking wrapper around one request's unit of work.
///
/// Clones point at the same transaction, so the copy held by the runtime
/// context and the copy held by the pipeline always agree on the state.
/// A commit or rollback whose backend call fails still ends the lifecycle
/// in `RolledBack`: the unit of work is unusable afterwards and is never
/// finalized twice.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl TransactionHandle {
    /// Handle for routes without transactional needs.
    #[must_use]
    pub fn noop() -> Self {
        Self::with_state(Backend::NoOp, TransactionState::NoOp)
    }

    /// Wraps a backend transaction that has not been started yet.
    #[must_use]
    pub fn new(tx: Box<dyn Transaction>) -> Self {
        Self::with_state(Backend::Real(tx), TransactionState::NotStarted)
    }

    /// Wraps a backend transaction that the source already opened.
    #[must_use]
    pub fn opened(tx: Box<dyn Transaction>) -> Self {
        Self::with_state(Backend::Real(tx), TransactionState::Open)
    }

    fn with_state(backend: Backend, state: TransactionState) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                backend,
                state: Mutex::new(state),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self.inner.backend, Backend::NoOp)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == TransactionState::Open
    }

    /// Moves a `NotStarted` handle to `Open`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidState`] from any other state
    /// except `NoOp`, which accepts the call.
    pub fn begin(&self) -> Result<(), TransactionError> {
        let mut state = self.inner.state.lock();
        match *state {
            TransactionState::NotStarted => {
                *state = TransactionState::Open;
                Ok(())
            }
            TransactionState::NoOp => Ok(()),
            other => Err(TransactionError::InvalidState {
                operation: "begin",
                state: other,
            }),
        }
    }

    /// Commits an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidState`] unless the handle is open
    /// (or no-op), including while another commit or rollback is in flight,
    /// and [`TransactionError::Commit`] when the backend fails.
    pub async fn commit(&self) -> Result<(), TransactionError> {
        let Some(tx) = self.ready_for("commit")? else {
            return Ok(());
        };
        let result = tx.commit().await;
        match result {
            Ok(()) => {
                self.settle(TransactionState::Committed);
                Ok(())
            }
            Err(err) => {
                self.settle(TransactionState::RolledBack);
                Err(TransactionError::Commit(err))
            }
        }
    }

    /// Rolls back an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidState`] unless the handle is open
    /// (or no-op), and [`TransactionError::Rollback`] when the backend fails.
    pub async fn rollback(&self) -> Result<(), TransactionError> {
        let Some(tx) = self.ready_for("rollback")? else {
            return Ok(());
        };
        let result = tx.rollback().await;
        self.settle(TransactionState::RolledBack);
        result.map_err(TransactionError::Rollback)
    }

    /// Downcasts the backend's [`Transaction::reference`] to `T`.
    #[must_use]
    pub fn reference<T: Any>(&self) -> Option<&T> {
        match &self.inner.backend {
            Backend::NoOp => None,
            Backend::Real(tx) => tx.reference()?.downcast_ref::<T>(),
        }
    }

    /// Claims an open handle for finalization and returns the backend to
    /// call, `None` for the no-op handle.
    fn ready_for(
        &self,
        operation: &'static str,
    ) -> Result<Option<&dyn Transaction>, TransactionError> {
        let Backend::Real(tx) = &self.inner.backend else {
            return Ok(None);
        };
        let mut state = self.inner.state.lock();
        if *state != TransactionState::Open {
            return Err(TransactionError::InvalidState {
                operation,
                state: *state,
            });
        }
        *state = TransactionState::Finalizing;
        Ok(Some(tx.as_ref()))
    }

    /// Moves a claimed handle to its terminal state.
    fn settle(&self, next: TransactionState) {
        let mut state = self.inner.state.lock();
        if *state == TransactionState::Finalizing {
            *state = next;
        }
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("noop", &self.is_noop())
            .field("state", &self.state())
            .finish()
    }
}
