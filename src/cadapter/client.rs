//! High-level object client wrapping backend operations on a single bucket.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// What the store reports about a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub content_type: Option<String>,
    /// Last modification time as epoch seconds, when the store reports one.
    pub updated: Option<i64>,
}

/// Result of a prefix listing.
///
/// With a delimiter, `keys` holds the immediate children of the prefix and
/// `common_prefixes` the immediate child "directories" (each ending with the
/// delimiter). Without one, every key under the prefix lands in `keys`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

impl ObjectListing {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.common_prefixes.is_empty()
    }
}

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put_object(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Object metadata, `None` when the key does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectInfo>>;

    /// Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    async fn list_objects(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head_object(key).await?.is_some())
    }

    /// True when at least one key starts with `prefix`.
    async fn has_prefix(&self, prefix: &str) -> Result<bool> {
        Ok(!self.list_objects(prefix, None).await?.is_empty())
    }

    async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        let data = self
            .get_object(from)
            .await?
            .ok_or_else(|| anyhow::anyhow!("source object {from} does not exist"))?;
        let content_type = self.head_object(from).await?.and_then(|i| i.content_type);
        self.put_object(to, &data, content_type.as_deref()).await
    }

    /// Removes the directory marker `key/`.
    ///
    /// Returns `Ok(false)` when objects other than the marker still live
    /// under the prefix. A prefix with no objects at all counts as removed.
    async fn remove_dir(&self, key: &str) -> Result<bool> {
        let marker = format!("{}/", key.trim_end_matches('/'));
        let listing = self.list_objects(&marker, None).await?;
        if listing.keys.iter().any(|k| *k != marker) || !listing.common_prefixes.is_empty() {
            return Ok(false);
        }
        if listing.keys.iter().any(|k| *k == marker) {
            self.delete_object(&marker).await?;
        }
        Ok(true)
    }
}

/// Cheaply cloneable handle shared by every component that talks to the
/// bucket.
#[derive(Clone)]
pub struct ObjectClient {
    backend: Arc<dyn ObjectBackend>,
}

impl ObjectClient {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self { backend }
    }

    pub async fn put_object(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        debug!(key, len = data.len(), "put object");
        self.backend.put_object(key, data, content_type).await
    }

    pub async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!(key, "get object");
        self.backend.get_object(key).await
    }

    pub async fn head_object(&self, key: &str) -> Result<Option<ObjectInfo>> {
        self.backend.head_object(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        debug!(key, "delete object");
        self.backend.delete_object(key).await
    }

    pub async fn list_objects(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        self.backend.list_objects(prefix, delimiter).await
    }

    pub async fn has_prefix(&self, prefix: &str) -> Result<bool> {
        self.backend.has_prefix(prefix).await
    }

    pub async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        debug!(from, to, "copy object");
        self.backend.copy_object(from, to).await
    }

    pub async fn remove_dir(&self, key: &str) -> Result<bool> {
        self.backend.remove_dir(key).await
    }
}
