//! Reference server binary: CLI + config load + signal-driven graceful
//! shutdown, wiring `veltro-core`'s router/dispatcher and
//! `veltro-observability`'s access logger and metrics collector into one
//! running process. Exposes only the ambient `/healthz` and metrics
//! routes — `demos/basic-app` is where route registration, middleware and
//! a multi-layer DAL are demonstrated end to end.
//!
//! Grounded on `ando-server::main`'s wiring order (config load → registry
//! / pool warmup → bind listener → signal-driven graceful shutdown); the
//! `monoio`-specific worker-thread spawn and admin-API thread are dropped
//! along with the gateway-specific resources they served.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use veltro_core::middleware::{handler, middleware};
use veltro_core::response;
use veltro_core::router::SwapRouter;
use veltro_observability::access_log::AccessLogEntry;
use veltro_observability::logger::{AccessLogger, AccessLoggerConfig, StdoutSink};
use veltro_observability::metrics::MetricsCollector;
use veltro_observability::prometheus_exporter::render_metrics;
use veltro_runtime::{Application, RouterHandle};

use config::ServerConfig;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "veltro", version, about = "Veltro reference server")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, default_value = "veltro.yaml")]
    config: PathBuf,

    /// Log level, used when `RUST_LOG` isn't set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "veltro starting");

    let config = ServerConfig::load(Some(&cli.config))?;
    info!(addr = %config.listen_addr, pool_warmup = config.pool_warmup, "configuration loaded");

    let metrics = Arc::new(MetricsCollector::new()?);
    let access_log = Arc::new(AccessLogger::new(
        AccessLoggerConfig {
            enabled: config.access_log.enabled,
            batch_size: config.access_log.batch_size,
            flush_interval: Duration::from_secs(config.access_log.flush_interval_secs),
        },
        Arc::new(StdoutSink),
    ));

    let router = Arc::new(SwapRouter::new());
    let mut app =
        Application::new(RouterHandle::Lockfree(router)).with_pool_warmup(config.pool_warmup);
    app.use_mw(access_log_middleware(Arc::clone(&access_log)));
    app.use_mw(metrics_middleware(Arc::clone(&metrics)));

    app.route(
        "GET",
        "/healthz",
        handler(|ctx| {
            response::text(ctx, 200, "ok");
            Ok(())
        }),
    )?;

    {
        let metrics = Arc::clone(&metrics);
        app.route(
            "GET",
            &config.metrics_path,
            handler(move |ctx| {
                response::text(ctx, 200, &render_metrics(&metrics));
                Ok(())
            }),
        )?;
    }

    let app = Arc::new(app);
    let bound = Arc::clone(&app).serve(config.listen_addr).await?;
    info!(addr = %bound, "veltro is ready — serving traffic");

    setup_signal_handler();
    wait_for_shutdown_signal().await;

    info!("shutdown signal received, draining in-flight requests");
    app.shutdown(Duration::from_millis(config.shutdown_deadline_ms))
        .await?;
    info!("veltro stopped");
    Ok(())
}

fn setup_signal_handler() {
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

async fn wait_for_shutdown_signal() {
    while !SHUTDOWN.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wraps every registered route to record one `http_requests_total` /
/// `http_request_duration` sample per request.
fn metrics_middleware(metrics: Arc<MetricsCollector>) -> veltro_core::middleware::Middleware {
    middleware(move |next| {
        let metrics = Arc::clone(&metrics);
        handler(move |ctx| {
            let method = String::from_utf8_lossy(ctx.method_bytes()).into_owned();
            let route = String::from_utf8_lossy(ctx.path_bytes()).into_owned();
            let start = std::time::Instant::now();
            let result = next(ctx);
            let duration_secs = start.elapsed().as_secs_f64();
            metrics.record_request(&route, &method, ctx.status(), duration_secs);
            result
        })
    })
}

/// Wraps every registered route to emit one [`AccessLogEntry`] per request,
/// off the hot path via the bounded channel inside `AccessLogger`.
fn access_log_middleware(access_log: Arc<AccessLogger>) -> veltro_core::middleware::Middleware {
    middleware(move |next| {
        let access_log = Arc::clone(&access_log);
        handler(move |ctx| {
            let method = String::from_utf8_lossy(ctx.method_bytes()).into_owned();
            let uri = String::from_utf8_lossy(ctx.path_bytes()).into_owned();
            let start = std::time::Instant::now();
            let result = next(ctx);
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            access_log.log(AccessLogEntry {
                timestamp: chrono::Utc::now().to_rfc3339(),
                route_id: uri.clone(),
                client_ip: "-".to_string(),
                method,
                uri,
                response_status: ctx.status(),
                latency_ms,
                upstream_addr: None,
            });
            result
        })
    })
}
