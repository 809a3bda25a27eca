//! The stage contract and a closure-based adapter.

use std::fmt;

use async_trait::async_trait;

use super::context::ExecutionContext;

/// What a stage's pre-work tells the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next stage.
    Continue,
    /// Stop forward progress. Stages that already started still unwind.
    Abort,
}

/// One unit of a request pipeline.
///
/// The executor calls `before` on every stage in order until one aborts,
/// then calls `after` on every stage whose `before` ran, in reverse order.
/// A stage therefore wraps everything registered after it.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Pre-work, run on the way in.
    async fn before(&self, _ctx: &mut ExecutionContext) -> Flow {
        Flow::Continue
    }

    /// Post-work, run on the way out.
    async fn after(&self, _ctx: &mut ExecutionContext) {}
}

type BeforeFn = Box<dyn Fn(&mut ExecutionContext) -> Flow + Send + Sync>;
type AfterFn = Box<dyn Fn(&mut ExecutionContext) + Send + Sync>;

/// A [`Stage`] built from synchronous closures.
///
/// Handy for hooks that only inspect or annotate the context.
pub struct FnStage {
    name: &'static str,
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
}

impl FnStage {
    /// Stage with pre-work only.
    pub fn before<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> Flow + Send + Sync + 'static,
    {
        Self {
            name,
            before: Some(Box::new(f)),
            after: None,
        }
    }

    /// Stage with post-work only.
    pub fn after<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&mut ExecutionContext) + Send + Sync + 'static,
    {
        Self {
            name,
            before: None,
            after: Some(Box::new(f)),
        }
    }

    /// Stage with both pre- and post-work.
    pub fn around<B, A>(name: &'static str, before: B, after: A) -> Self
    where
        B: Fn(&mut ExecutionContext) -> Flow + Send + Sync + 'static,
        A: Fn(&mut ExecutionContext) + Send + Sync + 'static,
    {
        Self {
            name,
            before: Some(Box::new(before)),
            after: Some(Box::new(after)),
        }
    }
}

impl fmt::Debug for FnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn before(&self, ctx: &mut ExecutionContext) -> Flow {
        match &self.before {
            Some(f) => f(ctx),
            None => Flow::Continue,
        }
    }

    async fn after(&self, ctx: &mut ExecutionContext) {
        if let Some(f) = &self.after {
            f(ctx);
        }
    }
}
