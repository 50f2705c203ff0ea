//! Access log: a bounded-channel logger that never blocks the request
//! hot path.
//!
//! Grounded on `ando-observability::logger::VictoriaLogsExporter` (true
//! no-op when disabled, `try_send` into a bounded `mpsc` channel, a
//! background flush task batching by size or interval). The
//! VictoriaLogs-specific push loop is replaced by a pluggable [`Sink`]
//! trait — this spec has no remote logging backend, so the demo
//! application can print to stdout while a real deployment wires up
//! whatever backend it uses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::debug;

use crate::access_log::AccessLogEntry;

/// Receives batches of access log entries off the hot path.
pub trait Sink: Send + Sync + 'static {
    fn write_batch(&self, entries: &[AccessLogEntry]);
}

/// Writes one JSON line per entry to stdout. Used by the demo app and by
/// tests; production deployments implement [`Sink`] against their own
/// log pipeline.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn write_batch(&self, entries: &[AccessLogEntry]) {
        for entry in entries {
            if let Ok(line) = serde_json::to_string(entry) {
                println!("{line}");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessLoggerConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for AccessLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// True no-op when disabled: no channel or background task is created,
/// and `log()` becomes a single branch-predicted check.
pub struct AccessLogger {
    sender: Option<mpsc::Sender<AccessLogEntry>>,
}

impl AccessLogger {
    pub fn new(config: AccessLoggerConfig, sink: Arc<dyn Sink>) -> Self {
        if !config.enabled {
            return Self { sender: None };
        }
        let (tx, rx) = mpsc::channel(10_000);
        tokio::spawn(Self::flush_loop(config, rx, sink));
        Self { sender: Some(tx) }
    }

    /// No-op constructor for disabled logging.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    #[inline]
    pub fn log(&self, entry: AccessLogEntry) {
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(entry);
        }
    }

    async fn flush_loop(
        config: AccessLoggerConfig,
        mut rx: mpsc::Receiver<AccessLogEntry>,
        sink: Arc<dyn Sink>,
    ) {
        let mut batch: Vec<AccessLogEntry> = Vec::with_capacity(config.batch_size);
        let mut flush_interval = interval(config.flush_interval);

        loop {
            tokio::select! {
                Some(entry) = rx.recv() => {
                    batch.push(entry);
                    if batch.len() >= config.batch_size {
                        sink.write_batch(&batch);
                        debug!(count = batch.len(), "flushed access log batch");
                        batch.clear();
                    }
                }
                _ = flush_interval.tick() => {
                    if !batch.is_empty() {
                        sink.write_batch(&batch);
                        debug!(count = batch.len(), "flushed access log batch on interval");
                        batch.clear();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn disabled_config() -> AccessLoggerConfig {
        AccessLoggerConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn enabled_config() -> AccessLoggerConfig {
        AccessLoggerConfig {
            enabled: true,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }

    struct CountingSink {
        batches: Mutex<Vec<usize>>,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }
    }

    impl Sink for CountingSink {
        fn write_batch(&self, entries: &[AccessLogEntry]) {
            self.batches.lock().unwrap().push(entries.len());
        }
    }

    fn sample_entry(route_id: &str) -> AccessLogEntry {
        AccessLogEntry {
            timestamp: "2026-07-31T00:00:00Z".to_string(),
            route_id: route_id.to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            uri: "/api".to_string(),
            response_status: 200,
            latency_ms: 1.5,
            upstream_addr: None,
        }
    }

    #[test]
    fn disabled_constructor_has_no_sender() {
        let logger = AccessLogger::disabled();
        assert!(logger.sender.is_none());
    }

    #[test]
    fn new_with_disabled_config_has_no_sender() {
        let logger = AccessLogger::new(disabled_config(), CountingSink::new());
        assert!(logger.sender.is_none());
    }

    #[test]
    fn log_on_disabled_does_not_panic() {
        let logger = AccessLogger::disabled();
        logger.log(sample_entry("r1"));
    }

    #[tokio::test]
    async fn new_with_enabled_config_has_sender() {
        let logger = AccessLogger::new(enabled_config(), CountingSink::new());
        assert!(logger.sender.is_some());
    }

    #[tokio::test]
    async fn log_on_enabled_does_not_block() {
        let logger = AccessLogger::new(enabled_config(), CountingSink::new());
        for i in 0..5 {
            logger.log(sample_entry(&format!("r{i}")));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn batch_is_flushed_once_batch_size_is_reached() {
        let sink = CountingSink::new();
        let logger = AccessLogger::new(
            AccessLoggerConfig {
                enabled: true,
                batch_size: 3,
                flush_interval: Duration::from_secs(60),
            },
            Arc::clone(&sink) as Arc<dyn Sink>,
        );
        for i in 0..3 {
            logger.log(sample_entry(&format!("r{i}")));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*sink.batches.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn log_backpressure_does_not_panic() {
        let logger = AccessLogger::new(
            AccessLoggerConfig {
                flush_interval: Duration::from_secs(60),
                ..enabled_config()
            },
            CountingSink::new(),
        );
        for i in 0..10_100u32 {
            logger.log(sample_entry(&format!("r{i}")));
        }
    }
}
