//! Shared fixtures for pipeline unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, Uri};
use stagehand_core::{EnvContext, Transaction, TransactionSource};

use super::context::{ExecutionContext, RequestParts};

pub(crate) fn request(method: Method, uri: &'static str) -> RequestParts {
    RequestParts::new(method, Uri::from_static(uri))
}

pub(crate) fn context(request: RequestParts) -> ExecutionContext {
    ExecutionContext::new(request, EnvContext::global())
}

/// Counters shared between a [`RecordingSource`] and its transactions.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub opened: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
}

/// Transaction source that records calls and fails on request.
#[derive(Debug, Default)]
pub(crate) struct RecordingSource {
    pub calls: Arc<Calls>,
    pub fail_open: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl RecordingSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing_open() -> Arc<Self> {
        let source = Self::default();
        source.fail_open.store(true, Ordering::SeqCst);
        Arc::new(source)
    }

    pub(crate) fn failing_commit() -> Arc<Self> {
        let source = Self::default();
        source.fail_commit.store(true, Ordering::SeqCst);
        Arc::new(source)
    }

    pub(crate) fn failing_rollback() -> Arc<Self> {
        let source = Self::default();
        source.fail_rollback.store(true, Ordering::SeqCst);
        Arc::new(source)
    }

    pub(crate) fn opened(&self) -> u32 {
        self.calls.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn commits(&self) -> u32 {
        self.calls.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn rollbacks(&self) -> u32 {
        self.calls.rollbacks.load(Ordering::SeqCst)
    }

    fn open(&self) -> anyhow::Result<Box<dyn Transaction>> {
        if self.fail_open.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.calls.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingTx {
            calls: Arc::clone(&self.calls),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
            fail_rollback: self.fail_rollback.load(Ordering::SeqCst),
        }))
    }
}

#[async_trait]
impl TransactionSource for RecordingSource {
    async fn open_managed(&self) -> anyhow::Result<Box<dyn Transaction>> {
        self.open()
    }

    async fn open_unmanaged(&self) -> anyhow::Result<Box<dyn Transaction>> {
        self.open()
    }
}

struct RecordingTx {
    calls: Arc<Calls>,
    fail_commit: bool,
    fail_rollback: bool,
}

#[async_trait]
impl Transaction for RecordingTx {
    async fn commit(&self) -> anyhow::Result<()> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            anyhow::bail!("disk full");
        }
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            anyhow::bail!("connection lost");
        }
        Ok(())
    }
}
