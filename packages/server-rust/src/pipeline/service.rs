//! Business function contract.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use stagehand_core::{BusinessOutcome, RuntimeContext};

use super::context::{BoundModel, ExecutionContext};

/// The user-supplied function a pipeline wraps.
///
/// Failures are reported through the returned [`BusinessOutcome`], never as
/// errors or panics. Any `Fn(RuntimeContext, ServiceInput) -> impl Future`
/// closure implements this trait.
#[async_trait]
pub trait BusinessService: Send + Sync {
    async fn call(&self, runtime: RuntimeContext, input: ServiceInput) -> BusinessOutcome;
}

#[async_trait]
impl<F, Fut> BusinessService for F
where
    F: Fn(RuntimeContext, ServiceInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BusinessOutcome> + Send + 'static,
{
    async fn call(&self, runtime: RuntimeContext, input: ServiceInput) -> BusinessOutcome {
        (self)(runtime, input).await
    }
}

/// Inputs bound by the route's binder stages.
///
/// Every accessor panics when the route has no binder for it: asking for a
/// body on a route that never declared one is a wiring mistake, not a
/// client error.
#[derive(Debug, Clone)]
pub struct ServiceInput {
    body: Option<BoundModel>,
    headers: Option<BoundModel>,
    path_params: Option<HashMap<String, String>>,
    query: Option<BoundModel>,
}

impl ServiceInput {
    pub(crate) fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            body: ctx.body.try_get().cloned(),
            headers: ctx.headers.try_get().cloned(),
            path_params: ctx.path_params.try_get().cloned(),
            query: ctx.query.try_get().cloned(),
        }
    }

    /// The decoded request body.
    ///
    /// # Panics
    ///
    /// Panics if the route has no body binder or it bound another type.
    #[must_use]
    pub fn body<T: Any>(&self) -> &T {
        model(self.body.as_ref(), "input model")
    }

    /// The decoded headers model. Fields the request lacked keep their
    /// default values.
    ///
    /// # Panics
    ///
    /// Panics if the route has no headers binder or it bound another type.
    #[must_use]
    pub fn headers<T: Any>(&self) -> &T {
        model(self.headers.as_ref(), "headers")
    }

    /// The decoded query model. Fields the request lacked keep their
    /// default values.
    ///
    /// # Panics
    ///
    /// Panics if the route has no query binder or it bound another type.
    #[must_use]
    pub fn query<T: Any>(&self) -> &T {
        model(self.query.as_ref(), "query params")
    }

    /// All path parameters the route declared, each non-empty.
    ///
    /// # Panics
    ///
    /// Panics if the route has no path-parameter binder.
    #[must_use]
    pub fn path_params(&self) -> &HashMap<String, String> {
        self.path_params
            .as_ref()
            .expect("Missing required input params. Is pipeline correct?")
    }

    /// One declared path parameter.
    ///
    /// # Panics
    ///
    /// Panics if the route has no path-parameter binder or never declared
    /// `name`.
    #[must_use]
    pub fn path_param(&self, name: &str) -> &str {
        self.path_params()
            .get(name)
            .unwrap_or_else(|| panic!("Path parameter `{name}` is not declared by the route"))
    }
}

fn model<'a, T: Any>(slot: Option<&'a BoundModel>, what: &str) -> &'a T {
    let Some(bound) = slot else {
        panic!("Missing required {what}. Is pipeline correct?");
    };
    bound.downcast_ref::<T>().unwrap_or_else(|| {
        panic!(
            "Route bound {what} as `{}`, not `{}`",
            bound.type_name(),
            type_name::<T>()
        )
    })
}

#[cfg(test)]
mod tests {
    use http::{Method, Uri};
    use stagehand_core::{ApiStatus, CorrelationContext, EnvContext, TenantIdentity, TransactionHandle};

    use super::*;
    use crate::pipeline::context::RequestParts;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            RequestParts::new(Method::GET, Uri::from_static("/")),
            EnvContext::global(),
        )
    }

    #[test]
    fn accessors_return_bound_values() {
        let mut ctx = ctx();
        ctx.body.set(BoundModel::new(String::from("payload")));
        ctx.path_params
            .set(HashMap::from([("id".to_string(), "7".to_string())]));

        let input = ServiceInput::from_context(&ctx);
        assert_eq!(input.body::<String>(), "payload");
        assert_eq!(input.path_param("id"), "7");
    }

    #[test]
    #[should_panic(expected = "Missing required query params. Is pipeline correct?")]
    fn unbound_query_panics() {
        let input = ServiceInput::from_context(&ctx());
        let _ = input.query::<String>();
    }

    #[test]
    #[should_panic(expected = "Missing required input params. Is pipeline correct?")]
    fn unbound_path_params_panics() {
        let input = ServiceInput::from_context(&ctx());
        let _ = input.path_params();
    }

    #[test]
    #[should_panic(expected = "not `u64`")]
    fn wrong_model_type_panics() {
        let mut ctx = ctx();
        ctx.headers.set(BoundModel::new(1_u8));
        let input = ServiceInput::from_context(&ctx);
        let _ = input.headers::<u64>();
    }

    #[tokio::test]
    async fn closures_are_business_services() {
        let service = |rt: RuntimeContext, _input: ServiceInput| async move {
            BusinessOutcome::fail(ApiStatus::EntityDoesNotExist, "missing", rt.corr_id())
        };
        let runtime = RuntimeContext::new(
            CorrelationContext::new("c-3"),
            TransactionHandle::noop(),
            TenantIdentity::system(),
        );
        let outcome = service
            .call(runtime, ServiceInput::from_context(&ctx()))
            .await;
        assert_eq!(outcome.status(), ApiStatus::EntityDoesNotExist);
        assert_eq!(outcome.detail(), "c-3");
    }
}
