//! In-memory reference [`Layer`] implementation.
//!
//! Grounded on `ando-store::cache::ConfigCache`'s `DashMap`-backed fields —
//! the same concurrent-map-plus-atomics shape, generalized from a fixed
//! set of named resource maps to one generic `K -> V` map.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::DalError;
use crate::tier::{Layer, LayerStats};

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// An unbounded, process-local tier. Expiration is checked lazily on read;
/// there is no background sweeper.
pub struct MemoryLayer<K, V> {
    name: String,
    store: DashMap<K, Entry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> MemoryLayer<K, V>
where
    K: Eq + Hash,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl<K, V> Layer<K, V> for MemoryLayer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &K) -> Result<V, DalError> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Err(DalError::NotFound);
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(DalError::NotFound)
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), DalError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.store.insert(key, Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), DalError> {
        match self.store.remove(key) {
            Some(_) => Ok(()),
            None => Err(DalError::NotFound),
        }
    }

    async fn exists(&self, key: &K) -> Result<bool, DalError> {
        let expired = match self.store.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(false),
        };
        if expired {
            self.store.remove(key);
        }
        Ok(!expired)
    }

    fn supports_iteration(&self) -> bool {
        true
    }

    async fn range(
        &self,
        sink: mpsc::Sender<Result<(K, V), DalError>>,
    ) -> Result<(), DalError> {
        // Snapshot first so no shard lock is held across the `.send().await`
        // below — holding one would risk a writer starving on the same
        // shard while this producer is suspended waiting on the consumer.
        let snapshot: Vec<(K, V)> = self
            .store
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| (entry.key().clone(), entry.value.clone()))
            .collect();
        for (key, value) in snapshot {
            if sink.send(Ok((key, value))).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> LayerStats {
        LayerStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: Some(self.store.len() as u64),
        }
    }

    async fn close(&self) -> Result<(), DalError> {
        self.store.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let layer = MemoryLayer::new("l0");
        layer.set("a".to_string(), 1, None).await.unwrap();
        assert_eq!(layer.get(&"a".to_string()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_on_missing_key_is_not_found() {
        let layer: MemoryLayer<String, i32> = MemoryLayer::new("l0");
        assert_eq!(layer.get(&"missing".to_string()).await, Err(DalError::NotFound));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_not_found_and_is_evicted() {
        let layer = MemoryLayer::new("l0");
        layer
            .set("a".to_string(), 1, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(layer.get(&"a".to_string()).await, Err(DalError::NotFound));
        assert!(layer.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_found() {
        let layer: MemoryLayer<String, i32> = MemoryLayer::new("l0");
        assert_eq!(
            layer.delete(&"missing".to_string()).await,
            Err(DalError::NotFound)
        );
    }

    #[tokio::test]
    async fn stats_report_hits_and_misses() {
        let layer = MemoryLayer::new("l0");
        layer.set("a".to_string(), 1, None).await.unwrap();
        let _ = layer.get(&"a".to_string()).await;
        let _ = layer.get(&"missing".to_string()).await;
        let stats = layer.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
