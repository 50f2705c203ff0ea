//! The `Layer` trait and the types a DAL configuration is built from.
//!
//! Grounded on `ando-store::cache::ConfigCache`'s single concurrently
//! accessible store, generalized into a capability trait any number of
//! stores can implement, and an ordered `TierConfig` list the coordinator
//! walks fastest-to-slowest.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DalError;

/// A tier-scoped transaction handle. The DAL never synthesizes multi-tier
/// atomicity; committing or rolling back only affects the tier that
/// produced this handle.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), DalError>;
    async fn rollback(self: Box<Self>) -> Result<(), DalError>;
}

/// One storage backend within an ordered DAL configuration.
///
/// The batch methods (`get_multi`/`set_multi`/`delete_multi`) have correct
/// default implementations that loop over the single-key methods, so a
/// minimal `Layer` only needs `get`/`set`/`delete`/`exists`/`stats`/`close`.
/// Override them (and `supports_batch`) when the backend has a genuinely
/// cheaper batched path. `range`/`keys`/`values`/`begin_tx` have no
/// sensible generic default and report "not supported" unless overridden.
#[async_trait]
pub trait Layer<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str;

    async fn get(&self, key: &K) -> Result<V, DalError>;
    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), DalError>;
    async fn delete(&self, key: &K) -> Result<(), DalError>;
    async fn exists(&self, key: &K) -> Result<bool, DalError>;

    fn supports_batch(&self) -> bool {
        false
    }

    async fn get_multi(&self, keys: &[K]) -> (HashMap<K, V>, HashMap<K, DalError>) {
        let mut found = HashMap::new();
        let mut failed = HashMap::new();
        for key in keys {
            match self.get(key).await {
                Ok(v) => {
                    found.insert(key.clone(), v);
                }
                Err(e) => {
                    failed.insert(key.clone(), e);
                }
            }
        }
        (found, failed)
    }

    async fn set_multi(
        &self,
        entries: Vec<(K, V)>,
        ttl: Option<Duration>,
    ) -> HashMap<K, DalError> {
        let mut failed = HashMap::new();
        for (key, value) in entries {
            if let Err(e) = self.set(key.clone(), value, ttl).await {
                failed.insert(key, e);
            }
        }
        failed
    }

    async fn delete_multi(&self, keys: &[K]) -> HashMap<K, DalError> {
        let mut failed = HashMap::new();
        for key in keys {
            if let Err(e) = self.delete(key).await {
                failed.insert(key.clone(), e);
            }
        }
        failed
    }

    fn supports_iteration(&self) -> bool {
        false
    }

    /// Stream every entry through `sink`. Implementations must stop
    /// producing as soon as `sink.send` reports the receiver is gone.
    async fn range(
        &self,
        _sink: tokio::sync::mpsc::Sender<Result<(K, V), DalError>>,
    ) -> Result<(), DalError> {
        Err(DalError::IterationNotSupported)
    }

    fn supports_tx(&self) -> bool {
        false
    }

    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, DalError> {
        Err(DalError::TxNotSupported)
    }

    async fn stats(&self) -> LayerStats;

    async fn close(&self) -> Result<(), DalError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerStats {
    pub hits: u64,
    pub misses: u64,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct DalStats {
    pub per_layer: HashMap<String, LayerStats>,
    pub hit_rate: f64,
}

/// One slot in the DAL's ordered tier stack.
pub struct TierConfig<K, V> {
    pub name: String,
    pub layer: Arc<dyn Layer<K, V>>,
    /// Zero means "no expiration; use the layer's own default".
    pub default_ttl: Duration,
    pub read_only: bool,
}

impl<K, V> TierConfig<K, V> {
    pub fn new(name: impl Into<String>, layer: Arc<dyn Layer<K, V>>) -> Self {
        Self {
            name: name.into(),
            layer,
            default_ttl: Duration::ZERO,
            read_only: false,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Per-call overrides for `Dal::set`/`set_multi`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub skip_layers: Vec<String>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            skip_layers: Vec::new(),
        }
    }

    pub fn skip(mut self, layer_name: impl Into<String>) -> Self {
        self.skip_layers.push(layer_name.into());
        self
    }
}
