//! Demo application: every `veltro-core`/`veltro-dal`/`veltro-runtime`
//! module wired into one small service — a static route, a `:param`
//! route backed by a two-tier DAL, a `*wildcard` route wrapped with
//! route-scoped middleware on top of a global one.
//!
//! This is supplementary scaffolding exercising the framework, not a new
//! framework module — see `veltro-server` for the thin reference binary
//! the framework itself ships.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use veltro_core::error::CoreError;
use veltro_core::middleware::{handler, middleware, Middleware};
use veltro_core::response;
use veltro_core::router::SwapRouter;
use veltro_dal::layers::latent::LatentMemoryLayer;
use veltro_dal::layers::memory::MemoryLayer;
use veltro_dal::{Dal, DalConfig, Layer, TierConfig};
use veltro_observability::metrics::MetricsCollector;
use veltro_observability::prometheus_exporter::render_metrics;
use veltro_runtime::{Application, RouterHandle};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    // A fast, empty in-memory tier in front of a slower one pre-seeded
    // with "existing" records, so the first `/users/:id` lookup for a
    // seeded id demonstrates read-through promotion into the fast tier.
    let backing_store = LatentMemoryLayer::new("backing-store", Duration::from_millis(20));
    backing_store
        .set(
            "1".to_string(),
            User {
                id: "1".to_string(),
                name: "Ada Lovelace".to_string(),
            },
            None,
        )
        .await?;
    let hot_cache = MemoryLayer::new("hot-cache");

    let metrics = Arc::new(MetricsCollector::new()?);

    let users: Arc<Dal<String, User>> = Arc::new(
        Dal::new(
            vec![
                TierConfig::new("hot-cache", Arc::new(hot_cache) as Arc<dyn Layer<String, User>>),
                TierConfig::new(
                    "backing-store",
                    Arc::new(backing_store) as Arc<dyn Layer<String, User>>,
                ),
            ],
            DalConfig::default(),
        )?
        .with_metrics(Arc::clone(&metrics)),
    );

    let router = Arc::new(SwapRouter::new());
    let mut app = Application::new(RouterHandle::Lockfree(router)).with_pool_warmup(16);
    app.use_mw(request_id_mw());

    app.route(
        "GET",
        "/health",
        handler(|ctx| {
            response::text(ctx, 200, "ok");
            Ok(())
        }),
    )?;

    {
        let metrics = Arc::clone(&metrics);
        app.route(
            "GET",
            "/metrics",
            handler(move |ctx| {
                response::text(ctx, 200, &render_metrics(&metrics));
                Ok(())
            }),
        )?;
    }

    {
        let users = Arc::clone(&users);
        app.route(
            "GET",
            "/users/:id",
            handler(move |ctx| {
                let id = ctx.param("id").unwrap_or_default().to_string();
                let users = Arc::clone(&users);
                let result = tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(users.get(&id))
                });
                match result {
                    Ok(user) => response::json(ctx, 200, &user)?,
                    Err(_) => response::text(ctx, 404, "user not found"),
                }
                Ok(())
            }),
        )?;
    }

    let files_link = app.route(
        "GET",
        "/files/*path",
        handler(|ctx| {
            let path = ctx.param("path").unwrap_or_default().to_string();
            response::json(ctx, 200, &json!({ "path": path }))?;
            Ok(())
        }),
    )?;
    // Route-scoped middleware applies only once re-registered: the
    // first `app.route` call above already wired the unscoped handler,
    // this re-registration overwrites it with the auth-checked version.
    let scoped_files = files_link.use_middleware(&[require_demo_token_mw()]);
    app.register(&scoped_files)?;

    let app = Arc::new(app);
    let addr = Arc::clone(&app)
        .serve("127.0.0.1:8088".parse()?)
        .await?;
    tracing::info!(%addr, "basic-app demo listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    app.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

/// Stamps every request with an incrementing id, demonstrating the
/// global-middleware slot of [`veltro_core::context::Context::trace_id`].
fn request_id_mw() -> Middleware {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    middleware(|next| {
        handler(move |ctx| {
            let id = COUNTER.fetch_add(1, Ordering::Relaxed);
            ctx.set_trace_id(Arc::from(format!("req-{id}")));
            next(ctx)
        })
    })
}

/// Route-scoped middleware: short-circuits with 401 unless a demo token
/// header is present.
fn require_demo_token_mw() -> Middleware {
    middleware(|next| {
        handler(move |ctx| {
            if ctx.header("x-demo-token").is_none() {
                response::write_error(ctx, &CoreError::Unauthorized);
                return Ok(());
            }
            next(ctx)
        })
    })
}
