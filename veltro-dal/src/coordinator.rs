//! The DAL coordinator: an ordered, non-empty stack of [`TierConfig`]s
//! walked fastest-to-slowest, with read-promotion and write-through
//! fan-out. Grounded on `ando-store::cache::ConfigCache`'s single
//! coordinator over named concurrent stores, generalized to N tiers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;
use veltro_observability::metrics::MetricsCollector;

use crate::error::DalError;
use crate::tier::{DalStats, SetOptions, TierConfig, Transaction};

/// Builder/config for a [`Dal`]. All three flags default to their most
/// conservative setting (promotion and write-through off, metrics on).
#[derive(Debug, Clone)]
pub struct DalConfig {
    pub enable_promotion: bool,
    pub write_through: bool,
    pub enable_metrics: bool,
}

impl Default for DalConfig {
    fn default() -> Self {
        Self {
            enable_promotion: true,
            write_through: true,
            enable_metrics: true,
        }
    }
}

pub struct Dal<K, V> {
    tiers: Vec<TierConfig<K, V>>,
    config: DalConfig,
    closed: AtomicBool,
    metrics: Option<Arc<MetricsCollector>>,
}

fn effective_ttl(explicit: Option<Duration>, tier_default: Duration) -> Option<Duration> {
    let ttl = explicit.unwrap_or(tier_default);
    if ttl.is_zero() {
        None
    } else {
        Some(ttl)
    }
}

impl<K, V> Dal<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `tiers` must be non-empty; returns `LayerNotFound` otherwise (there
    /// is no dedicated "empty config" variant in the taxonomy, and an
    /// empty stack is, structurally, every lookup failing to find a tier).
    pub fn new(tiers: Vec<TierConfig<K, V>>, config: DalConfig) -> Result<Self, DalError> {
        if tiers.is_empty() {
            return Err(DalError::LayerNotFound("<no tiers configured>".into()));
        }
        Ok(Self {
            tiers,
            config,
            closed: AtomicBool::new(false),
            metrics: None,
        })
    }

    /// Attaches a metrics collector; every `get`/`set`/`delete` then
    /// records a `dal_operations_total` sample per tier it touches
    /// (subject to `DalConfig::enable_metrics`).
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn check_open(&self) -> Result<(), DalError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DalError::Closed)
        } else {
            Ok(())
        }
    }

    fn record_op(&self, tier: &str, operation: &str, outcome: &str) {
        if self.config.enable_metrics {
            if let Some(metrics) = &self.metrics {
                metrics.record_dal_operation(tier, operation, outcome);
            }
        }
    }

    async fn promote(&self, found_at: usize, key: &K, value: &V) {
        if !self.config.enable_promotion || found_at == 0 {
            return;
        }
        for tier in self.tiers[..found_at].iter().filter(|t| !t.read_only) {
            let ttl = effective_ttl(None, tier.default_ttl);
            let _ = tier.layer.set(key.clone(), value.clone(), ttl).await;
        }
    }

    pub async fn get(&self, key: &K) -> Result<V, DalError> {
        self.check_open()?;
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.layer.get(key).await {
                Ok(value) => {
                    self.record_op(&tier.name, "get", "hit");
                    self.promote(i, key, &value).await;
                    return Ok(value);
                }
                Err(DalError::NotFound) => {
                    self.record_op(&tier.name, "get", "miss");
                    continue;
                }
                Err(e) => {
                    self.record_op(&tier.name, "get", "error");
                    warn!(layer = tier.name.as_str(), error = %e, "dal: layer get failed, continuing");
                    continue;
                }
            }
        }
        Err(DalError::NotFound)
    }

    pub async fn exists(&self, key: &K) -> Result<bool, DalError> {
        self.check_open()?;
        for tier in &self.tiers {
            match tier.layer.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(e) => {
                    warn!(layer = tier.name.as_str(), error = %e, "dal: layer exists failed, continuing");
                    continue;
                }
            }
        }
        Ok(false)
    }

    fn write_targets(&self, skip_layers: &[String]) -> Vec<&TierConfig<K, V>> {
        if self.config.write_through {
            self.tiers
                .iter()
                .filter(|t| !t.read_only && !skip_layers.iter().any(|s| s == &t.name))
                .collect()
        } else {
            self.tiers
                .first()
                .filter(|t| !t.read_only && !skip_layers.iter().any(|s| s == &t.name))
                .into_iter()
                .collect()
        }
    }

    pub async fn set(&self, key: K, value: V, options: SetOptions) -> Result<(), DalError> {
        self.check_open()?;
        let targets = self.write_targets(&options.skip_layers);
        if targets.is_empty() {
            return Err(DalError::NoWritableLayers);
        }
        let mut first_error = None;
        let mut any_ok = false;
        for tier in targets {
            let ttl = effective_ttl(options.ttl, tier.default_ttl);
            match tier.layer.set(key.clone(), value.clone(), ttl).await {
                Ok(()) => {
                    any_ok = true;
                    self.record_op(&tier.name, "set", "ok");
                }
                Err(e) => {
                    self.record_op(&tier.name, "set", "error");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if any_ok {
            Ok(())
        } else {
            Err(first_error.unwrap_or(DalError::NoWritableLayers))
        }
    }

    pub async fn delete(&self, key: &K) -> Result<(), DalError> {
        self.check_open()?;
        let targets: Vec<&TierConfig<K, V>> =
            self.tiers.iter().filter(|t| !t.read_only).collect();
        if targets.is_empty() {
            return Err(DalError::NoWritableLayers);
        }
        let mut first_error = None;
        let mut any_ok = false;
        for tier in targets {
            match tier.layer.delete(key).await {
                Ok(()) => {
                    any_ok = true;
                    self.record_op(&tier.name, "delete", "ok");
                }
                Err(DalError::NotFound) => {
                    any_ok = true;
                    self.record_op(&tier.name, "delete", "miss");
                }
                Err(e) => {
                    self.record_op(&tier.name, "delete", "error");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if any_ok {
            Ok(())
        } else {
            Err(first_error.unwrap_or(DalError::NotFound))
        }
    }

    pub async fn get_multi(
        &self,
        keys: &[K],
    ) -> (HashMap<K, V>, HashMap<K, DalError>) {
        let mut found = HashMap::new();
        let mut remaining: Vec<K> = keys.to_vec();

        if self.closed.load(Ordering::Acquire) {
            let mut errors = HashMap::new();
            for k in remaining {
                errors.insert(k, DalError::Closed);
            }
            return (found, errors);
        }

        for (i, tier) in self.tiers.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            if tier.layer.supports_batch() {
                let (hits, _misses) = tier.layer.get_multi(&remaining).await;
                remaining.retain(|k| !hits.contains_key(k));
                for (k, v) in &hits {
                    self.promote(i, k, v).await;
                }
                found.extend(hits);
            } else {
                let mut still_remaining = Vec::with_capacity(remaining.len());
                for key in remaining {
                    match tier.layer.get(&key).await {
                        Ok(v) => {
                            self.promote(i, &key, &v).await;
                            found.insert(key, v);
                        }
                        Err(DalError::NotFound) => still_remaining.push(key),
                        Err(e) => {
                            warn!(layer = tier.name.as_str(), error = %e, "dal: layer get_multi fallback failed, continuing");
                            still_remaining.push(key);
                        }
                    }
                }
                remaining = still_remaining;
            }
        }

        let mut errors = HashMap::new();
        for k in remaining {
            errors.insert(k, DalError::NotFound);
        }
        (found, errors)
    }

    pub async fn set_multi(
        &self,
        entries: Vec<(K, V)>,
        options: SetOptions,
    ) -> HashMap<K, DalError> {
        if let Err(e) = self.check_open() {
            return entries.into_iter().map(|(k, _)| (k, e.clone())).collect();
        }
        let targets = self.write_targets(&options.skip_layers);
        if targets.is_empty() {
            return entries
                .into_iter()
                .map(|(k, _)| (k, DalError::NoWritableLayers))
                .collect();
        }

        let mut succeeded: Vec<K> = Vec::new();
        for tier in targets {
            let ttl = effective_ttl(options.ttl, tier.default_ttl);
            let failed = tier.layer.set_multi(entries.clone(), ttl).await;
            for (key, _) in &entries {
                if !failed.contains_key(key) && !succeeded.iter().any(|k| k == key) {
                    succeeded.push(key.clone());
                }
            }
        }

        entries
            .into_iter()
            .filter(|(k, _)| !succeeded.iter().any(|s| s == k))
            .map(|(k, _)| (k, DalError::NoWritableLayers))
            .collect()
    }

    pub async fn delete_multi(&self, keys: &[K]) -> HashMap<K, DalError> {
        if let Err(e) = self.check_open() {
            return keys.iter().cloned().map(|k| (k, e.clone())).collect();
        }
        let targets: Vec<&TierConfig<K, V>> =
            self.tiers.iter().filter(|t| !t.read_only).collect();
        if targets.is_empty() {
            return keys
                .iter()
                .cloned()
                .map(|k| (k, DalError::NoWritableLayers))
                .collect();
        }

        let mut succeeded: Vec<K> = Vec::new();
        for tier in targets {
            let failed = tier.layer.delete_multi(keys).await;
            for key in keys {
                let was_notfound_only_fail = failed
                    .get(key)
                    .map(|e| !matches!(e, DalError::NotFound))
                    .unwrap_or(false);
                if !was_notfound_only_fail && !succeeded.iter().any(|k| k == key) {
                    succeeded.push(key.clone());
                }
            }
        }

        keys.iter()
            .cloned()
            .filter(|k| !succeeded.iter().any(|s| s == k))
            .map(|k| (k, DalError::NotFound))
            .collect()
    }

    fn first_iterable_tier(&self) -> Result<&TierConfig<K, V>, DalError> {
        self.tiers
            .iter()
            .find(|t| t.layer.supports_iteration())
            .ok_or(DalError::IterationNotSupported)
    }

    /// Spawns the producing tier's `range` on the runtime and returns the
    /// receiving half; dropping the receiver is the cancellation signal.
    pub async fn range(&self) -> Result<mpsc::Receiver<Result<(K, V), DalError>>, DalError> {
        self.check_open()?;
        let tier = self.first_iterable_tier()?;
        let layer = tier.layer.clone();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let _ = layer.range(tx).await;
        });
        Ok(rx)
    }

    pub async fn keys(&self) -> Result<Vec<K>, DalError> {
        let mut rx = self.range().await?;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok((k, _)) => out.push(k),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub async fn values(&self) -> Result<Vec<V>, DalError> {
        let mut rx = self.range().await?;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok((_, v)) => out.push(v),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub async fn begin_tx(&self) -> Result<Box<dyn Transaction>, DalError> {
        self.check_open()?;
        let tier = self
            .tiers
            .iter()
            .find(|t| t.layer.supports_tx())
            .ok_or(DalError::TxNotSupported)?;
        tier.layer.begin_tx().await
    }

    /// Idempotent in outcome (a second call returns `Closed`), but the
    /// first call always attempts to close every tier regardless of
    /// earlier failures.
    pub async fn close(&self) -> Result<(), DalError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DalError::Closed);
        }
        let mut first_error = None;
        for tier in &self.tiers {
            if let Err(e) = tier.layer.close().await {
                warn!(layer = tier.name.as_str(), error = %e, "dal: layer close failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn stats(&self) -> DalStats {
        let mut per_layer = HashMap::new();
        let mut total_hits = 0u64;
        let mut total_misses = 0u64;
        for tier in &self.tiers {
            let s = tier.layer.stats().await;
            total_hits += s.hits;
            total_misses += s.misses;
            per_layer.insert(tier.name.clone(), s);
        }
        let hit_rate = if total_hits + total_misses == 0 {
            0.0
        } else {
            total_hits as f64 / (total_hits + total_misses) as f64
        };
        DalStats {
            per_layer,
            hit_rate,
        }
    }
}
