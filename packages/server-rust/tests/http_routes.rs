//! End-to-end scenarios through the axum router.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use stagehand_core::{ApiStatus, BusinessOutcome, RuntimeContext, Transaction, TransactionSource};
use stagehand_server::{
    HttpModule, MemoryStore, MemoryTransaction, NetworkConfig, PipelineConfig, ServiceInput,
    TenantPolicy, TransactionPolicy,
};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    commits: AtomicU32,
    rollbacks: AtomicU32,
}

/// Source whose transactions count calls and can refuse to commit.
#[derive(Default)]
struct RecordingSource {
    counters: Arc<Counters>,
    fail_commit: bool,
}

struct RecordingTx {
    counters: Arc<Counters>,
    fail_commit: bool,
}

#[async_trait]
impl Transaction for RecordingTx {
    async fn commit(&self) -> anyhow::Result<()> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            anyhow::bail!("replica unavailable");
        }
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransactionSource for RecordingSource {
    async fn open_managed(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(RecordingTx {
            counters: Arc::clone(&self.counters),
            fail_commit: self.fail_commit,
        }))
    }

    async fn open_unmanaged(&self) -> anyhow::Result<Box<dyn Transaction>> {
        self.open_managed().await
    }
}

#[derive(Debug, Deserialize)]
struct Rename {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Search {
    #[serde(default)]
    q: String,
    #[serde(default)]
    page: u32,
}

fn module() -> HttpModule {
    HttpModule::new(NetworkConfig {
        body_limit: 64,
        ..NetworkConfig::default()
    })
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

fn with_tenant(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder
        .header("X-Tenant-ID", "acme")
        .header("X-Tenant-UserID", "alice")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_tenant_headers_are_rejected() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&calls);
    let mut module = module();
    module
        .add_route(
            Method::GET,
            "/secure",
            &PipelineConfig::builder()
                .tenant(TenantPolicy::FromHeaders)
                .build(),
            move |_rt: RuntimeContext, _input: ServiceInput| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { BusinessOutcome::ok(json!("secret")) }
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, headers, body) = send(
        &router,
        request(Method::GET, "/secure").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 1);
    assert_eq!(body["error"]["msg"], "Failed to get user information");
    assert_eq!(headers["x-correlation-id"], body["error"]["corrId"].as_str().unwrap());
    assert!(body.get("data").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn managed_not_found_rolls_back() {
    let source = Arc::new(RecordingSource::default());
    let counters = Arc::clone(&source.counters);
    let mut module = module();
    module
        .add_route(
            Method::GET,
            "/orders/{id}",
            &PipelineConfig::builder()
                .tenant(TenantPolicy::FromHeaders)
                .transaction(TransactionPolicy::Managed(source))
                .input_params(["id"])
                .build(),
            |_rt: RuntimeContext, input: ServiceInput| async move {
                BusinessOutcome::fail(
                    ApiStatus::EntityDoesNotExist,
                    "Order not found",
                    format!("order {}", input.path_param("id")),
                )
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, body) = send(
        &router,
        with_tenant(request(Method::GET, "/orders/9"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 3);
    assert_eq!(body["error"]["devMsg"], "order 9");
    assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(counters.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn commit_failure_becomes_server_error() {
    let source = Arc::new(RecordingSource {
        fail_commit: true,
        ..RecordingSource::default()
    });
    let mut module = module();
    module
        .add_route(
            Method::POST,
            "/ledger",
            &PipelineConfig::builder()
                .transaction(TransactionPolicy::Managed(source))
                .build(),
            |_rt: RuntimeContext, _input: ServiceInput| async { BusinessOutcome::ok(json!(1)) },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, body) = send(
        &router,
        request(Method::POST, "/ledger").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], 6);
    assert_eq!(body["error"]["msg"], "Failed to commit changes");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn missing_path_param_is_reported() {
    let mut module = module();
    module
        .add_route(
            Method::GET,
            "/items",
            &PipelineConfig::builder().input_params(["id"]).build(),
            |_rt: RuntimeContext, _input: ServiceInput| async { BusinessOutcome::ok(json!([])) },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, body) = send(&router, request(Method::GET, "/items").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 4);
    assert_eq!(body["error"]["devMsg"], "Cannot find parameter id");
}

#[tokio::test]
async fn malformed_and_oversized_bodies_are_rejected() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&calls);
    let mut module = module();
    module
        .add_route(
            Method::PUT,
            "/profiles/{id}",
            &PipelineConfig::builder()
                .input_model::<Rename>()
                .input_params(["id"])
                .build(),
            move |_rt: RuntimeContext, input: ServiceInput| {
                counted.fetch_add(1, Ordering::SeqCst);
                let name = input.body::<Rename>().name.clone();
                async move { BusinessOutcome::ok(json!({ "name": name })) }
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, body) = send(
        &router,
        request(Method::PUT, "/profiles/1")
            .body(Body::from("{\"name\": 5"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 6);
    assert_eq!(body["error"]["msg"], "API needs a valid payload");

    let oversized = format!("{{\"name\": \"{}\"}}", "x".repeat(200));
    let (status, _, _) = send(
        &router,
        request(Method::PUT, "/profiles/1")
            .body(Body::from(oversized))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (status, _, body) = send(
        &router,
        request(Method::PUT, "/profiles/1")
            .body(Body::from("{\"name\": \"Ada\"}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "name": "Ada" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn defaults_reflect_business_outcome() {
    let mut module = module();
    module
        .add_route(
            Method::GET,
            "/whoami",
            &PipelineConfig::default(),
            |rt: RuntimeContext, _input: ServiceInput| async move {
                BusinessOutcome::ok(json!({
                    "tenant": rt.tenant().id(),
                    "user": rt.tenant().user_id(),
                    "noop": rt.transaction().is_noop(),
                }))
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, headers, body) = send(
        &router,
        request(Method::GET, "/whoami")
            .header("X-Correlation-ID", "req-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-correlation-id"], "req-42");
    assert_eq!(
        body,
        json!({
            "error": { "code": 0, "msg": "", "devMsg": "", "corrId": "req-42" },
            "data": { "tenant": "Global", "user": "system", "noop": true },
        })
    );
}

#[tokio::test]
async fn path_params_are_percent_decoded_and_query_is_bound() {
    let mut module = module();
    module
        .add_route(
            Method::GET,
            "/catalog/{section}",
            &PipelineConfig::builder()
                .input_params(["section"])
                .query_params::<Search>()
                .build(),
            |_rt: RuntimeContext, input: ServiceInput| async move {
                let search = input.query::<Search>();
                BusinessOutcome::ok(json!({
                    "section": input.path_param("section"),
                    "q": search.q,
                    "page": search.page,
                }))
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, body) = send(
        &router,
        request(Method::GET, "/catalog/home%20garden?q=lamp&page=2")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "section": "home garden", "q": "lamp", "page": 2 }));

    let (_, _, body) = send(
        &router,
        request(Method::GET, "/catalog/tools?page=many")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"], json!({ "section": "tools", "q": "", "page": 0 }));
}

#[tokio::test(start_paused = true)]
async fn slow_business_times_out_with_408() {
    let finished = Arc::new(AtomicU32::new(0));
    let done = Arc::clone(&finished);
    let mut module = HttpModule::new(NetworkConfig {
        request_timeout: Duration::from_secs(1),
        ..NetworkConfig::default()
    });
    module
        .add_route(
            Method::GET,
            "/slow",
            &PipelineConfig::default(),
            move |_rt: RuntimeContext, _input: ServiceInput| {
                let done = Arc::clone(&done);
                async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    BusinessOutcome::ok("late")
                }
            },
        )
        .unwrap();
    let router = module.build_router();

    let response = router
        .oneshot(request(Method::GET, "/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_route_gets_an_envelope() {
    let router = module().build_router();
    let (status, headers, body) = send(&router, request(Method::GET, "/nope").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 5);
    assert!(headers.contains_key("x-correlation-id"));

    let (status, headers, body) = send(
        &router,
        request(Method::GET, "/nope")
            .header("X-Correlation-ID", "trace-404")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["corrId"], "trace-404");
    assert_eq!(headers["x-correlation-id"], "trace-404");
}

#[tokio::test]
async fn memory_store_commits_only_successful_writes() {
    let store = MemoryStore::new();
    let mut module = module();
    module
        .add_route(
            Method::POST,
            "/counters/{name}",
            &PipelineConfig::builder()
                .tenant(TenantPolicy::FromHeaders)
                .transaction(TransactionPolicy::Managed(Arc::new(store.clone())))
                .input_params(["name"])
                .build(),
            |rt: RuntimeContext, input: ServiceInput| async move {
                let Some(tx) = rt.transaction().reference::<MemoryTransaction>() else {
                    return BusinessOutcome::fail(ApiStatus::Unexpected, "no store", "");
                };
                let name = input.path_param("name");
                tx.put(format!("{}/{name}", rt.tenant().id()), json!(1));
                if name == "reject" {
                    return BusinessOutcome::fail(ApiStatus::UnknownItemRequested, "rejected", name);
                }
                BusinessOutcome::ok(json!({ "stored": name }))
            },
        )
        .unwrap();
    let router = module.build_router();

    let (status, _, _) = send(
        &router,
        with_tenant(request(Method::POST, "/counters/visits"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &router,
        with_tenant(request(Method::POST, "/counters/reject"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.get("acme/visits"), Some(json!(1)));
    assert!(!store.contains_key("acme/reject"));
}
