//! Local directory backend, used to mock the bucket (implements ObjectBackend).
//!
//! Keys map to relative paths under `root`. A key ending with `/` is a
//! directory marker and maps to a directory; empty directories are listed
//! back as markers.

use crate::cadapter::client::{ObjectBackend, ObjectInfo, ObjectListing};
use crate::vfs::path::guess_content_type;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::{fs, io::AsyncWriteExt};

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_end_matches('/'))
    }

    /// Every key in the bucket, sorted.
    async fn walk(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root.clone(), String::new())];
        while let Some((dir, rel)) = stack.pop() {
            let mut rd = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut empty = true;
            while let Some(entry) = rd.next_entry().await? {
                empty = false;
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                if entry.file_type().await?.is_dir() {
                    stack.push((entry.path(), key));
                } else {
                    out.push(key);
                }
            }
            if empty && !rel.is_empty() {
                out.push(format!("{rel}/"));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Removes now-empty parent directories of `path`, stopping at the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut cur = path.parent();
        while let Some(dir) = cur {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            cur = dir.parent();
        }
    }
}

#[async_trait]
impl ObjectBackend for LocalFsBackend {
    async fn put_object(&self, key: &str, data: &[u8], _content_type: Option<&str>) -> Result<()> {
        let path = self.path_for(key);
        if key.ends_with('/') {
            fs::create_dir_all(path).await?;
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut f = fs::File::create(path).await?;
        f.write_all(data).await?;
        f.flush().await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.ends_with('/') {
            return Ok(None);
        }
        match fs::read(self.path_for(key)).await {
            Ok(buf) => Ok(Some(buf)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let meta = match fs::metadata(self.path_for(key)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() != key.ends_with('/') {
            return Ok(None);
        }
        let updated = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        Ok(Some(ObjectInfo {
            size: if meta.is_dir() { 0 } else { meta.len() },
            content_type: Some(guess_content_type(key).to_string()),
            updated,
        }))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let res = if key.ends_with('/') {
            fs::remove_dir(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match res {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        let mut listing = ObjectListing::default();
        let mut prefixes = BTreeSet::new();
        for key in self.walk().await? {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match delimiter.and_then(|d| rest.find(d).map(|i| i + d.len())) {
                Some(end) => {
                    prefixes.insert(format!("{prefix}{}", &rest[..end]));
                }
                None => listing.keys.push(key.clone()),
            }
        }
        listing.common_prefixes = prefixes.into_iter().collect();
        Ok(listing)
    }
}
