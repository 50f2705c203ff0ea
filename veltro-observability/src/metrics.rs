//! Prometheus metrics collector.
//!
//! Grounded on `ando-observability::metrics::MetricsCollector`: a single
//! `Registry` built once, metric fields held as public handles so callers
//! record directly instead of going through a string-keyed lookup. The
//! push-to-VictoriaMetrics loop is dropped — this spec has no remote
//! metrics backend, so only the pull-style `gather_text()` exposition
//! survives.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder, Encoder};

/// Request, DAL and pool metrics for one running application.
pub struct MetricsCollector {
    registry: Registry,

    /// Total HTTP requests by route, method, status.
    pub http_requests_total: IntCounterVec,

    /// Request latency histogram by route.
    pub http_request_duration: HistogramVec,

    /// Connections currently being served.
    pub active_connections: IntGauge,

    /// DAL operations by tier, operation kind and outcome.
    pub dal_operations_total: IntCounterVec,

    /// Context pool size (checked-out handles currently in use).
    pub context_pool_in_use: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("veltro_http_requests_total", "Total HTTP requests").namespace("veltro"),
            &["route", "method", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "veltro_http_request_duration_seconds",
                "Request latency",
            )
            .namespace("veltro")
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["route"],
        )?;

        let active_connections = IntGauge::new(
            "veltro_active_connections",
            "Number of connections currently being served",
        )?;

        let dal_operations_total = IntCounterVec::new(
            Opts::new("veltro_dal_operations_total", "Total DAL tier operations").namespace("veltro"),
            &["tier", "operation", "outcome"],
        )?;

        let context_pool_in_use = IntGauge::new(
            "veltro_context_pool_in_use",
            "Context handles currently checked out of the pool",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(dal_operations_total.clone()))?;
        registry.register(Box::new(context_pool_in_use.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration,
            active_connections,
            dal_operations_total,
            context_pool_in_use,
        })
    }

    /// Record a completed HTTP request.
    pub fn record_request(&self, route: &str, method: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[route, method, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[route])
            .observe(duration_secs);
    }

    /// Record a DAL tier operation outcome (`"hit"`/`"miss"`/`"error"`).
    pub fn record_dal_operation(&self, tier: &str, operation: &str, outcome: &str) {
        self.dal_operations_total
            .with_label_values(&[tier, operation, outcome])
            .inc();
    }

    /// Prometheus text exposition for a scrape endpoint.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("failed to construct metrics registry")
    }
}
