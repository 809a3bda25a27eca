//! Per-route pipeline configuration.
//!
//! [`PipelineConfigBuilder`] starts from defaults (correlation logging,
//! system tenant, no-op transaction) and accepts policy selections or custom
//! stages. Singular stages follow last-call-wins; hooks accumulate in
//! declaration order. [`PipelineConfig`] is immutable once built and is
//! shared by every request to its route.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use stagehand_core::TransactionSource;

use super::stage::Stage;
use super::stages::{
    BodyBinder, CorrelationStage, FinalizeTransactionStage, HeaderTenantStage, HeadersBinder,
    NoTransactionStage, OpenTransactionStage, PathParamsBinder, QueryBinder, SystemTenantStage,
    TransactionMode,
};

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Built-in correlation logging policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPolicy {
    /// Read `X-Correlation-ID`, generating one when absent.
    #[default]
    Default,
}

/// Built-in tenant resolution policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TenantPolicy {
    /// Always the system tenant.
    #[default]
    None,
    /// Require `X-Tenant-ID` and `X-Tenant-UserID`.
    FromHeaders,
}

/// Built-in transaction policies.
#[derive(Clone, Default)]
pub enum TransactionPolicy {
    /// No-op handle, no finalize stage.
    #[default]
    None,
    /// Open from the source; the pipeline commits or rolls back.
    Managed(Arc<dyn TransactionSource>),
    /// Open from the source; business code settles it.
    Unmanaged(Arc<dyn TransactionSource>),
}

impl fmt::Debug for TransactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Managed(_) => "Managed",
            Self::Unmanaged(_) => "Unmanaged",
        })
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Immutable stage descriptor for one route.
#[derive(Clone)]
pub struct PipelineConfig {
    pub(crate) log: Arc<dyn Stage>,
    pub(crate) tenant: Arc<dyn Stage>,
    pub(crate) transaction: Arc<dyn Stage>,
    pub(crate) finalize: Option<Arc<dyn Stage>>,
    pub(crate) headers: Option<Arc<dyn Stage>>,
    pub(crate) body: Option<Arc<dyn Stage>>,
    pub(crate) path_params: Option<Arc<dyn Stage>>,
    pub(crate) query: Option<Arc<dyn Stage>>,
    pub(crate) before_hooks: Vec<Arc<dyn Stage>>,
    pub(crate) after_hooks: Vec<Arc<dyn Stage>>,
}

impl PipelineConfig {
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Whether every stage is named. The mandatory stages are always
    /// present because the builder substitutes defaults.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.stages().all(|stage| !stage.name().is_empty())
    }

    /// Whether a finalize stage settles the transaction.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.finalize.is_some()
    }

    #[must_use]
    pub fn before_hook_count(&self) -> usize {
        self.before_hooks.len()
    }

    #[must_use]
    pub fn after_hook_count(&self) -> usize {
        self.after_hooks.len()
    }

    fn stages(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        [&self.log, &self.tenant, &self.transaction]
            .into_iter()
            .chain(self.finalize.iter())
            .chain(self.headers.iter())
            .chain(self.body.iter())
            .chain(self.path_params.iter())
            .chain(self.query.iter())
            .chain(self.before_hooks.iter())
            .chain(self.after_hooks.iter())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfigBuilder::new().build()
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages().map(|stage| stage.name()).collect();
        f.debug_struct("PipelineConfig")
            .field("stages", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PipelineConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for [`PipelineConfig`].
///
/// ```ignore
/// let config = PipelineConfig::builder()
///     .tenant(TenantPolicy::FromHeaders)
///     .transaction(TransactionPolicy::Managed(store))
///     .input_model::<NewOrder>()
///     .input_params(["id"])
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig {
                log: Arc::new(CorrelationStage),
                tenant: Arc::new(SystemTenantStage),
                transaction: Arc::new(NoTransactionStage),
                finalize: None,
                headers: None,
                body: None,
                path_params: None,
                query: None,
                before_hooks: Vec::new(),
                after_hooks: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn log(mut self, policy: LogPolicy) -> Self {
        match policy {
            LogPolicy::Default => self.config.log = Arc::new(CorrelationStage),
        }
        self
    }

    /// Replaces the log stage. It must populate `ctx.log`.
    #[must_use]
    pub fn custom_log(mut self, stage: impl Stage + 'static) -> Self {
        self.config.log = Arc::new(stage);
        self
    }

    #[must_use]
    pub fn tenant(mut self, policy: TenantPolicy) -> Self {
        self.config.tenant = match policy {
            TenantPolicy::None => Arc::new(SystemTenantStage),
            TenantPolicy::FromHeaders => Arc::new(HeaderTenantStage),
        };
        self
    }

    /// Replaces the tenant stage. It must populate `ctx.tenant` or abort.
    #[must_use]
    pub fn custom_tenant(mut self, stage: impl Stage + 'static) -> Self {
        self.config.tenant = Arc::new(stage);
        self
    }

    /// Selects a transaction policy. Only `Managed` installs a finalize stage.
    #[must_use]
    pub fn transaction(mut self, policy: TransactionPolicy) -> Self {
        let (open, finalize): (Arc<dyn Stage>, Option<Arc<dyn Stage>>) = match policy {
            TransactionPolicy::None => (Arc::new(NoTransactionStage), None),
            TransactionPolicy::Managed(source) => (
                Arc::new(OpenTransactionStage::new(source, TransactionMode::Managed)),
                Some(Arc::new(FinalizeTransactionStage)),
            ),
            TransactionPolicy::Unmanaged(source) => (
                Arc::new(OpenTransactionStage::new(source, TransactionMode::Unmanaged)),
                None,
            ),
        };
        self.config.transaction = open;
        self.config.finalize = finalize;
        self
    }

    /// Replaces the transaction-open stage and drops any finalize stage.
    /// The stage must populate `ctx.transaction` or abort.
    #[must_use]
    pub fn custom_transaction(mut self, open: impl Stage + 'static) -> Self {
        self.config.transaction = Arc::new(open);
        self.config.finalize = None;
        self
    }

    /// Replaces both transaction stages. `finalize` only has post-work
    /// that matters; it runs after the business outcome is known.
    #[must_use]
    pub fn custom_transaction_with_finalize(
        mut self,
        open: impl Stage + 'static,
        finalize: impl Stage + 'static,
    ) -> Self {
        self.config.transaction = Arc::new(open);
        self.config.finalize = Some(Arc::new(finalize));
        self
    }

    /// Binds request headers into `H`.
    #[must_use]
    pub fn headers<H>(mut self) -> Self
    where
        H: DeserializeOwned + Default + Send + Sync + 'static,
    {
        self.config.headers = Some(Arc::new(HeadersBinder::<H>::new()));
        self
    }

    #[must_use]
    pub fn custom_headers(mut self, stage: impl Stage + 'static) -> Self {
        self.config.headers = Some(Arc::new(stage));
        self
    }

    /// Binds the JSON body into `B`.
    #[must_use]
    pub fn input_model<B>(mut self) -> Self
    where
        B: DeserializeOwned + Send + Sync + 'static,
    {
        self.config.body = Some(Arc::new(BodyBinder::<B>::new()));
        self
    }

    #[must_use]
    pub fn custom_input_model(mut self, stage: impl Stage + 'static) -> Self {
        self.config.body = Some(Arc::new(stage));
        self
    }

    /// Requires the named path parameters.
    #[must_use]
    pub fn input_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.path_params = Some(Arc::new(PathParamsBinder::new(names)));
        self
    }

    #[must_use]
    pub fn custom_input_params(mut self, stage: impl Stage + 'static) -> Self {
        self.config.path_params = Some(Arc::new(stage));
        self
    }

    /// Binds the query string into `Q`.
    #[must_use]
    pub fn query_params<Q>(mut self) -> Self
    where
        Q: DeserializeOwned + Default + Send + Sync + 'static,
    {
        self.config.query = Some(Arc::new(QueryBinder::<Q>::new()));
        self
    }

    #[must_use]
    pub fn custom_query_params(mut self, stage: impl Stage + 'static) -> Self {
        self.config.query = Some(Arc::new(stage));
        self
    }

    /// Appends a hook that runs after the binders, before the business
    /// function. Hooks run in declaration order.
    #[must_use]
    pub fn before_hook(mut self, stage: impl Stage + 'static) -> Self {
        self.config.before_hooks.push(Arc::new(stage));
        self
    }

    /// Appends a hook wrapped around the result mapping. Post-work of
    /// after-hooks runs in declaration order.
    #[must_use]
    pub fn after_hook(mut self, stage: impl Stage + 'static) -> Self {
        self.config.after_hooks.push(Arc::new(stage));
        self
    }

    #[must_use]
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::{Flow, FnStage};
    use crate::pipeline::testing::RecordingSource;

    fn names(config: &PipelineConfig) -> Vec<&'static str> {
        config.stages().map(|stage| stage.name()).collect()
    }

    #[test]
    fn defaults_are_log_tenant_noop_transaction() {
        let config = PipelineConfig::builder().build();
        assert!(config.is_valid());
        assert!(!config.is_managed());
        assert_eq!(names(&config), vec!["log", "tenant", "transaction"]);
    }

    #[test]
    fn managed_policy_installs_finalize() {
        let config = PipelineConfig::builder()
            .transaction(TransactionPolicy::Managed(RecordingSource::new()))
            .build();
        assert!(config.is_managed());
    }

    #[test]
    fn last_transaction_call_wins() {
        let config = PipelineConfig::builder()
            .transaction(TransactionPolicy::Managed(RecordingSource::new()))
            .transaction(TransactionPolicy::Unmanaged(RecordingSource::new()))
            .build();
        assert!(!config.is_managed());

        let config = PipelineConfig::builder()
            .transaction(TransactionPolicy::Managed(RecordingSource::new()))
            .custom_transaction(FnStage::before("tx", |_| Flow::Continue))
            .build();
        assert!(!config.is_managed());
    }

    #[test]
    fn last_singular_call_wins() {
        let config = PipelineConfig::builder()
            .input_params(["a"])
            .input_params(["b"])
            .custom_tenant(FnStage::before("custom-tenant", |_| Flow::Continue))
            .build();
        let names = names(&config);
        assert_eq!(names.iter().filter(|n| **n == "path-params").count(), 1);
        assert!(names.contains(&"custom-tenant"));
        assert!(!names.contains(&"tenant"));
    }

    #[test]
    fn hooks_accumulate_separately() {
        let config = PipelineConfig::builder()
            .before_hook(FnStage::before("b1", |_| Flow::Continue))
            .after_hook(FnStage::after("a1", |_| {}))
            .before_hook(FnStage::before("b2", |_| Flow::Continue))
            .after_hook(FnStage::after("a2", |_| {}))
            .build();
        assert_eq!(config.before_hook_count(), 2);
        assert_eq!(config.after_hook_count(), 2);
        let before: Vec<_> = config.before_hooks.iter().map(|s| s.name()).collect();
        let after: Vec<_> = config.after_hooks.iter().map(|s| s.name()).collect();
        assert_eq!(before, vec!["b1", "b2"]);
        assert_eq!(after, vec!["a1", "a2"]);
    }

    #[test]
    fn unnamed_stage_is_invalid() {
        let config = PipelineConfig::builder()
            .before_hook(FnStage::before("", |_| Flow::Continue))
            .build();
        assert!(!config.is_valid());
    }
}
