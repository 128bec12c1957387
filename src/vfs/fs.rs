//! `Gcsfs`: the stream-wrapper facade.
//!
//! Built once at startup and cloned freely; every clone shares the same
//! configuration, object client and metadata cache.

use crate::cadapter::client::{ObjectBackend, ObjectClient};
use crate::cadapter::s3::{S3Backend, S3Config};
use crate::config::GcsfsConfig;
use crate::meta::cache::MetadataCache;
use crate::meta::fast_cache::MokaFastCache;
use crate::meta::lock::LocalLockManager;
use crate::meta::record::CachedFileRecord;
use crate::meta::store::{RecordStore, SqliteRecordStore};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::path;
use std::sync::Arc;
use tracing::{info, warn};

/// Metadata changes a caller may request on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOption {
    Touch,
    Owner,
    OwnerName,
    Group,
    GroupName,
    /// chmod
    Access,
}

struct Inner {
    config: Arc<GcsfsConfig>,
    client: ObjectClient,
    meta: MetadataCache,
}

#[derive(Clone)]
pub struct Gcsfs {
    inner: Arc<Inner>,
}

impl Gcsfs {
    pub fn new(config: Arc<GcsfsConfig>, client: ObjectClient, meta: MetadataCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                meta,
            }),
        }
    }

    /// Wires `backend` and `store` together with a moka fast cache and
    /// process-local population locks tuned from `config`.
    pub fn with_backend(
        config: Arc<GcsfsConfig>,
        backend: Arc<dyn ObjectBackend>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let meta = MetadataCache::new(
            store,
            Arc::new(MokaFastCache::new(config.cache.capacity, config.cache.ttl())),
            Arc::new(LocalLockManager::new()),
            config.lock.clone(),
        );
        Self::new(config, ObjectClient::new(backend), meta)
    }

    /// S3-interop backend plus the SQLite record table named by `config`.
    pub async fn connect(config: GcsfsConfig) -> FsResult<Self> {
        config.validate()?;
        let s3 = S3Backend::with_config(S3Config::from_gcsfs(&config)?).await?;
        prepare_sqlite_dir(&config.database_url).await?;
        let store = SqliteRecordStore::connect(&config.database_url).await?;
        info!(
            bucket = ?config.bucket(),
            scheme = %config.scheme,
            cache_enabled = config.cache_enabled,
            "gcsfs ready"
        );
        Ok(Self::with_backend(
            Arc::new(config),
            Arc::new(s3),
            Arc::new(store),
        ))
    }

    pub fn config(&self) -> &GcsfsConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &ObjectClient {
        &self.inner.client
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.inner.meta
    }

    /// Deletes the object, then its cached record. A failed remote delete
    /// leaves the cache alone.
    pub async fn unlink(&self, uri: &str) -> FsResult<bool> {
        let key = path::to_object_key(uri, true);
        if key.is_empty() {
            return Err(FsError::access(uri, "cannot unlink the scheme root"));
        }
        if let Err(e) = self.client().delete_object(&key).await {
            warn!(uri, error = %e, "remote delete failed");
            return Err(FsError::Io(e));
        }
        self.metadata().delete([uri]).await?;
        Ok(true)
    }

    /// Server-side copy followed by delete of the source; not atomic.
    ///
    /// The cached record moves with the object. If the source had no
    /// record, any stale record for the destination is dropped instead.
    /// When the source cannot be deleted after the copy, the destination's
    /// record is dropped and the source's is kept.
    pub async fn rename(&self, from: &str, to: &str) -> FsResult<bool> {
        let from_key = path::to_object_key(from, true);
        let to_key = path::to_object_key(to, true);
        if from_key.is_empty() || to_key.is_empty() {
            return Err(FsError::access(from, "cannot rename to or from the scheme root"));
        }
        if !self.client().exists(&from_key).await? {
            return Err(FsError::not_found(from));
        }
        if from_key == to_key {
            return Ok(true);
        }

        if let Err(e) = self.client().copy_object(&from_key, &to_key).await {
            warn!(from, to, error = %e, "remote copy failed, source left in place");
            return Err(FsError::Io(e));
        }
        if let Err(e) = self.client().delete_object(&from_key).await {
            warn!(from, to, error = %e, "copied but could not delete the source");
            // the destination was overwritten; its old record is stale
            self.metadata().delete([to]).await?;
            return Err(FsError::Io(e));
        }

        let meta = self.metadata();
        match meta.read(from).await? {
            Some(mut record) => {
                record.uri = path::normalize_uri(to);
                meta.write(to, record).await?;
                meta.delete([from]).await?;
            }
            None => meta.delete([from, to]).await?,
        }
        Ok(true)
    }

    /// Cached record for `uri`, falling back to the bucket on a miss.
    /// `Ok(None)` means the object does not exist.
    pub async fn get_file_info(&self, uri: &str) -> FsResult<Option<CachedFileRecord>> {
        let cache_enabled = self.config().cache_enabled;
        if cache_enabled {
            if let Some(record) = self.metadata().read(uri).await? {
                return Ok(Some(record));
            }
        }

        let key = path::to_object_key(uri, true);
        if key.is_empty() {
            return Ok(None);
        }
        let Some(info) = self.client().head_object(&key).await? else {
            return Ok(None);
        };
        let record = CachedFileRecord::from_info(path::normalize_uri(uri), &info);
        if cache_enabled {
            self.metadata().write(uri, record.clone()).await?;
        }
        Ok(Some(record))
    }

    /// Public URL for `uri`.
    ///
    /// A derivative that does not exist yet points at the site's generator
    /// route instead of the bucket, so it gets built on first request.
    pub async fn external_url(&self, uri: &str) -> FsResult<Option<String>> {
        if self.get_file_info(uri).await?.is_none() {
            let raw = path::to_object_key(uri, false);
            if raw.split('/').next() == Some(path::STYLES_DIR) {
                let base = self.config().base_url.trim_end_matches('/');
                return Ok(Some(format!("{base}/gs/files/{}", encode_path(&raw))));
            }
        }

        let target = path::to_object_key(uri, true);
        if target.is_empty() {
            return Ok(None);
        }
        let bucket = self
            .config()
            .bucket()
            .ok_or_else(|| FsError::Config("no bucket configured".into()))?;
        let object_path = match target.rsplit_once('/') {
            Some((dir, name)) => format!("{dir}/{}", urlencoding::encode(name)),
            None => urlencoding::encode(&target).into_owned(),
        };
        let scheme = if self.config().https { "https" } else { "http" };
        Ok(Some(format!(
            "{scheme}://{bucket}.{}/{object_path}",
            self.config().domain
        )))
    }

    /// Only permission changes are accepted, and they are no-ops; objects
    /// carry no owner or mode.
    pub fn set_metadata(&self, uri: &str, option: MetadataOption) -> bool {
        let accepted = option == MetadataOption::Access;
        if !accepted {
            warn!(uri, ?option, "unsupported metadata change");
        }
        accepted
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `mode=rwc` creates the database file but not its directory.
async fn prepare_sqlite_dir(url: &str) -> FsResult<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or_default();
    if file.is_empty() || file == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(file).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FsError::Io(e.into()))?;
    }
    Ok(())
}
