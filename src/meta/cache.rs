//! `MetadataCache`: durable records fronted by a fast cache, populated
//! single-flight.
//!
//! Read path:
//! 1. fast cache hit (including a cached "absent") returns immediately;
//! 2. on a miss, try to take the population lock for the key;
//! 3. the winner selects from the durable store, fills the fast cache and
//!    releases; everybody else waits for the lock and starts over;
//! 4. a wait that times out, or too many rounds, reads the durable store
//!    directly without touching the fast cache.
//!
//! Mutations persist to the durable store first and evict second.

use crate::config::LockConfig;
use crate::meta::fast_cache::{FastCache, MokaFastCache};
use crate::meta::lock::{LocalLockManager, LockManager};
use crate::meta::record::CachedFileRecord;
use crate::meta::store::{MetaError, RecordStore};
use crate::vfs::path;
use std::sync::Arc;
use tracing::{debug, warn};

const CID_PREFIX: &str = "gcsfs:";

#[derive(Clone)]
pub struct MetadataCache {
    store: Arc<dyn RecordStore>,
    fast: Arc<dyn FastCache>,
    locks: Arc<dyn LockManager>,
    lock: LockConfig,
}

impl MetadataCache {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fast: Arc<dyn FastCache>,
        locks: Arc<dyn LockManager>,
        lock: LockConfig,
    ) -> Self {
        Self {
            store,
            fast,
            locks,
            lock,
        }
    }

    /// Moka fast cache and process-local locks in front of `store`.
    pub fn with_defaults(store: Arc<dyn RecordStore>) -> Self {
        Self::new(
            store,
            Arc::new(MokaFastCache::default()),
            Arc::new(LocalLockManager::new()),
            LockConfig::default(),
        )
    }

    fn cid(uri: &str) -> String {
        format!("{CID_PREFIX}{uri}")
    }

    pub async fn read(&self, uri: &str) -> Result<Option<CachedFileRecord>, MetaError> {
        let uri = path::normalize_uri(uri);
        let cid = Self::cid(&uri);

        for round in 0..=self.lock.max_retries {
            if let Some(hit) = self.fast.get(&cid).await {
                return Ok(hit);
            }

            if let Some(token) = self.locks.acquire(&cid, self.lock.acquire_timeout()).await {
                let result = self.populate(&uri, &cid).await;
                self.locks.release(&cid, token).await;
                return result;
            }

            debug!(uri = %uri, round, "population lock busy, waiting");
            if self.locks.wait(&cid, self.lock.wait_timeout()).await {
                let err = MetaError::LockTimeout { key: cid.clone() };
                warn!(error = %err, "reading durable store directly");
                return self.store.select(&uri).await;
            }
        }

        warn!(uri = %uri, retries = self.lock.max_retries, "lock retries exhausted, reading durable store directly");
        self.store.select(&uri).await
    }

    async fn populate(&self, uri: &str, cid: &str) -> Result<Option<CachedFileRecord>, MetaError> {
        // somebody may have filled it between our miss and the acquire
        if let Some(hit) = self.fast.get(cid).await {
            return Ok(hit);
        }
        let found = self.store.select(uri).await?;
        debug!(uri, found = found.is_some(), "populating fast cache");
        self.fast.set(cid, found.clone()).await;
        Ok(found)
    }

    /// Upserts `record` under the normalized `uri`, then evicts the fast
    /// cache entry.
    ///
    /// Ancestor directories need no records: they exist implicitly through
    /// the key prefix.
    pub async fn write(&self, uri: &str, mut record: CachedFileRecord) -> Result<(), MetaError> {
        let uri = path::normalize_uri(uri);
        record.uri = uri.clone();
        self.store.upsert(&record).await?;
        self.fast.delete(&Self::cid(&uri)).await;
        Ok(())
    }

    /// Removes every listed record; unknown URIs are ignored.
    pub async fn delete<I, S>(&self, uris: I) -> Result<(), MetaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let uris: Vec<String> = uris
            .into_iter()
            .map(|u| path::normalize_uri(u.as_ref()))
            .collect();
        if uris.is_empty() {
            return Ok(());
        }
        let removed = self.store.delete_many(&uris).await?;
        let cids: Vec<String> = uris.iter().map(|u| Self::cid(u)).collect();
        self.fast.delete_many(&cids).await;
        debug!(count = uris.len(), removed, "deleted cached records");
        Ok(())
    }

    /// Evicts the fast cache entry only; the durable record stays.
    pub async fn invalidate(&self, uri: &str) {
        let uri = path::normalize_uri(uri);
        self.fast.delete(&Self::cid(&uri)).await;
    }
}
