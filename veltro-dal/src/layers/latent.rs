//! A `MemoryLayer` wrapped with an artificial delay before every
//! operation, standing in for the "Redis adapter" / "SQL adapter" example
//! tiers that are out of scope for this crate — useful only for exercising
//! the coordinator's promotion (read-through) behavior in tests.

use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::memory::MemoryLayer;
use crate::error::DalError;
use crate::tier::{Layer, LayerStats};

pub struct LatentMemoryLayer<K, V> {
    inner: MemoryLayer<K, V>,
    delay: Duration,
}

impl<K, V> LatentMemoryLayer<K, V>
where
    K: Eq + Hash,
{
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: MemoryLayer::new(name),
            delay,
        }
    }
}

#[async_trait]
impl<K, V> Layer<K, V> for LatentMemoryLayer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &K) -> Result<V, DalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), DalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &K) -> Result<(), DalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &K) -> Result<bool, DalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.exists(key).await
    }

    fn supports_iteration(&self) -> bool {
        true
    }

    async fn range(
        &self,
        sink: mpsc::Sender<Result<(K, V), DalError>>,
    ) -> Result<(), DalError> {
        tokio::time::sleep(self.delay).await;
        self.inner.range(sink).await
    }

    async fn stats(&self) -> LayerStats {
        self.inner.stats().await
    }

    async fn close(&self) -> Result<(), DalError> {
        self.inner.close().await
    }
}
