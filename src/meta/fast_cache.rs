//! Fast read-through layer in front of the durable record store.
//!
//! Values are `Option<CachedFileRecord>` so that "known missing" is cached
//! as well as "known present".

use crate::meta::record::CachedFileRecord;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

#[async_trait]
pub trait FastCache: Send + Sync {
    /// Outer `None` is a miss; `Some(None)` is a cached absence.
    async fn get(&self, key: &str) -> Option<Option<CachedFileRecord>>;

    async fn set(&self, key: &str, value: Option<CachedFileRecord>);

    async fn delete(&self, key: &str);

    async fn delete_many(&self, keys: &[String]) {
        for key in keys {
            self.delete(key).await;
        }
    }

    async fn clear(&self);
}

#[derive(Clone)]
pub struct MokaFastCache {
    inner: Cache<String, Option<CachedFileRecord>>,
}

impl MokaFastCache {
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MokaFastCache {
    fn default() -> Self {
        Self::new(100_000, None)
    }
}

#[async_trait]
impl FastCache for MokaFastCache {
    async fn get(&self, key: &str) -> Option<Option<CachedFileRecord>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Option<CachedFileRecord>) {
        self.inner.insert(key.to_string(), value).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }
}
