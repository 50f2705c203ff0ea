//! Server configuration: listener address, pool warmup size, and the
//! ambient observability knobs.
//!
//! Grounded on `ando-core::config::AndoConfig::load` — a `figment`
//! layering of a YAML file over `ANDO_`-prefixed environment variables,
//! with `#[serde(default = ...)]` on every field so a missing file is
//! just "use the defaults", not an error.

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Number of `ContextState`s to pre-allocate on startup.
    #[serde(default = "default_pool_warmup")]
    pub pool_warmup: usize,

    /// Prometheus scrape path.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Access log configuration.
    #[serde(default)]
    pub access_log: AccessLogConfig,

    /// Graceful shutdown drain deadline, in milliseconds.
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_log_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_log_batch_size(),
            flush_interval_secs: default_log_flush_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads from an optional YAML file, layered under `VELTRO_`-prefixed
    /// environment variables (e.g. `VELTRO_LISTEN_ADDR`). Falls back to
    /// built-in defaults entirely when `path` doesn't exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("VELTRO_"));

        Ok(figment.extract()?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            pool_warmup: default_pool_warmup(),
            metrics_path: default_metrics_path(),
            access_log: AccessLogConfig::default(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_pool_warmup() -> usize {
    64
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_log_batch_size() -> usize {
    100
}

fn default_log_flush_interval_secs() -> u64 {
    5
}

fn default_shutdown_deadline_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_and_no_env() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.pool_warmup, 64);
        assert_eq!(config.metrics_path, "/metrics");
        assert!(config.access_log.enabled);
    }

    #[test]
    fn nonexistent_file_path_falls_back_to_defaults() {
        let config = ServerConfig::load(Some(Path::new("/nonexistent/veltro.yaml"))).unwrap();
        assert_eq!(config.listen_addr, default_listen_addr());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("veltro.yaml");
        std::fs::write(&file, "listen_addr: \"127.0.0.1:9999\"\npool_warmup: 8\n").unwrap();

        let config = ServerConfig::load(Some(&file)).unwrap();
        assert_eq!(config.listen_addr.port(), 9999);
        assert_eq!(config.pool_warmup, 8);
    }
}
