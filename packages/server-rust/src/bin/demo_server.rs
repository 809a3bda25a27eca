//! Demo order service: a few routes over an in-memory store.
//!
//! ```text
//! curl -H 'X-Tenant-ID: acme' -H 'X-Tenant-UserID: alice' \
//!      -d '{"sku":"A-1","qty":2}' localhost:8080/orders/42
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagehand_core::{ApiStatus, BusinessOutcome, EnvContext, RuntimeContext};
use stagehand_server::network::DEFAULT_BODY_LIMIT;
use stagehand_server::{
    init_tracing, FnStage, Flow, HttpModule, LogFormat, LogLevel, MemoryStore, MemoryTransaction,
    NetworkConfig, PipelineConfig, RouteError, ServiceInput, TelemetryConfig, TenantPolicy,
    TransactionPolicy,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "demo-server", about = "Stagehand demo order service")]
struct Args {
    /// Bind address.
    #[arg(long, env = "STAGEHAND_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Listen port; 0 picks a free one.
    #[arg(long, env = "STAGEHAND_PORT", default_value_t = 8080)]
    port: u16,
    /// error, warn, info, debug or trace.
    #[arg(long, env = "STAGEHAND_LOG_LEVEL", default_value = "info")]
    log_level: String,
    /// pretty or json.
    #[arg(long, env = "STAGEHAND_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
    /// Explicit tracing filter directive; overrides RUST_LOG and the level.
    #[arg(long)]
    log_filter: Option<String>,
    /// Allowed CORS origins, comma separated.
    #[arg(long, env = "STAGEHAND_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    sku: String,
    qty: u32,
}

#[derive(Debug, Serialize)]
struct Order {
    id: String,
    sku: String,
    qty: u32,
    created_by: String,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    limit: Option<usize>,
}

fn order_key(rt: &RuntimeContext, id: &str) -> String {
    format!("{}/orders/{id}", rt.tenant().id())
}

async fn create_order(rt: RuntimeContext, input: ServiceInput) -> BusinessOutcome {
    let Some(tx) = rt.transaction().reference::<MemoryTransaction>() else {
        return BusinessOutcome::fail(ApiStatus::Unexpected, "Storage unavailable", "no transaction");
    };
    let id = input.path_param("id");
    let key = order_key(&rt, id);
    if tx.contains_key(&key) {
        return BusinessOutcome::fail(
            ApiStatus::EntityAlreadyExists,
            "Order already exists",
            format!("order {id}"),
        );
    }

    let new_order = input.body::<NewOrder>();
    if new_order.qty == 0 {
        return BusinessOutcome::fail(
            ApiStatus::MissingRequiredItem,
            "Quantity must be positive",
            format!("qty=0 for sku {}", new_order.sku),
        );
    }
    let order = Order {
        id: id.to_string(),
        sku: new_order.sku.clone(),
        qty: new_order.qty,
        created_by: rt.tenant().user_id().to_string(),
    };
    match serde_json::to_value(&order) {
        Ok(value) => {
            tx.put(key, value.clone());
            BusinessOutcome::ok_value(value)
        }
        Err(err) => BusinessOutcome::fail(ApiStatus::Unexpected, "Failed to store order", err.to_string()),
    }
}

fn get_order(store: MemoryStore) -> impl stagehand_server::BusinessService + 'static {
    move |rt: RuntimeContext, input: ServiceInput| {
        let store = store.clone();
        async move {
            let id = input.path_param("id");
            match store.get(&order_key(&rt, id)) {
                Some(order) => BusinessOutcome::ok_value(order),
                None => BusinessOutcome::fail(
                    ApiStatus::EntityDoesNotExist,
                    "Order not found",
                    format!("order {id}"),
                ),
            }
        }
    }
}

fn list_orders(store: MemoryStore) -> impl stagehand_server::BusinessService + 'static {
    move |rt: RuntimeContext, input: ServiceInput| {
        let store = store.clone();
        async move {
            let limit = input.query::<Paging>().limit.unwrap_or(50);
            let orders: Vec<_> = store
                .scan_prefix(&format!("{}/orders/", rt.tenant().id()))
                .into_iter()
                .take(limit)
                .map(|(_, order)| order)
                .collect();
            BusinessOutcome::ok(orders)
        }
    }
}

async fn delete_order(rt: RuntimeContext, input: ServiceInput) -> BusinessOutcome {
    let Some(tx) = rt.transaction().reference::<MemoryTransaction>() else {
        return BusinessOutcome::fail(ApiStatus::Unexpected, "Storage unavailable", "no transaction");
    };
    let id = input.path_param("id");
    let key = order_key(&rt, id);
    if !tx.contains_key(&key) {
        return BusinessOutcome::fail(
            ApiStatus::EntityDoesNotExist,
            "Order not found",
            format!("order {id}"),
        );
    }
    tx.delete(key);
    BusinessOutcome::ok(json!({ "deleted": id }))
}

fn register_routes(module: &mut HttpModule, store: &MemoryStore) -> Result<(), RouteError> {
    let tag_tenant = || {
        FnStage::before("tag-tenant", |ctx| {
            let tenant = ctx.tenant.get().id().to_string();
            ctx.log.get_mut().add_extra("tenant", tenant);
            Flow::Continue
        })
    };

    module.add_route(
        Method::GET,
        "/health",
        &PipelineConfig::default(),
        |rt: RuntimeContext, _input: ServiceInput| async move {
            BusinessOutcome::ok(json!({ "status": "ok", "env": rt.env().name() }))
        },
    )?;

    let managed = TransactionPolicy::Managed(Arc::new(store.clone()));
    let create = PipelineConfig::builder()
        .tenant(TenantPolicy::FromHeaders)
        .transaction(managed.clone())
        .input_model::<NewOrder>()
        .input_params(["id"])
        .before_hook(tag_tenant())
        .build();
    module.add_route(Method::POST, "/orders/{id}", &create, create_order)?;

    let delete = PipelineConfig::builder()
        .tenant(TenantPolicy::FromHeaders)
        .transaction(managed)
        .input_params(["id"])
        .before_hook(tag_tenant())
        .build();
    module.add_route(Method::DELETE, "/orders/{id}", &delete, delete_order)?;

    let reads = PipelineConfig::builder()
        .tenant(TenantPolicy::FromHeaders)
        .input_params(["id"])
        .before_hook(tag_tenant())
        .build();
    module.add_route(Method::GET, "/orders/{id}", &reads, get_order(store.clone()))?;

    module.add_route(
        Method::GET,
        "/orders",
        &PipelineConfig::builder()
            .tenant(TenantPolicy::FromHeaders)
            .query_params::<Paging>()
            .build(),
        list_orders(store.clone()),
    )?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&TelemetryConfig {
        level: LogLevel::parse(&args.log_level),
        format: LogFormat::parse(&args.log_format),
        filter: args.log_filter.clone(),
    })?;

    let env = EnvContext::from_env_var("STAGEHAND_ENV");
    let config = NetworkConfig {
        host: args.host,
        port: args.port,
        cors_origins: args.cors_origins,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        body_limit: args.body_limit,
    };

    let store = MemoryStore::new();
    let mut module = HttpModule::new(config).with_env(env.clone());
    register_routes(&mut module, &store)?;

    let port = module.start().await?;
    info!(port, env = env.name(), routes = module.route_count(), "demo server ready");
    module.serve(shutdown_signal()).await
}
