//! Ambient observability stack: structured access logging and Prometheus
//! metrics.

pub mod access_log;
pub mod logger;
pub mod metrics;
pub mod prometheus_exporter;

pub use access_log::AccessLogEntry;
pub use logger::{AccessLogger, AccessLoggerConfig, Sink, StdoutSink};
pub use metrics::MetricsCollector;
