//! Directory emulation over key prefixes.
//!
//! No object is ever created for a directory. A directory "exists" while at
//! least one key lives under its prefix; `mkdir` is therefore always
//! satisfiable and `rmdir` only removes a stray marker object if there is
//! one.

use crate::meta::record::CachedFileRecord;
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::fs::Gcsfs;
use crate::vfs::path;
use tracing::{debug, warn};

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
const PERM_ALL: u32 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

/// What `stat` reports. Ownership, device and block fields are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileType,
    pub mode: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileStat {
    /// Synthetic directory: full permissions, nominal size 1, no times.
    pub fn directory() -> Self {
        Self {
            kind: FileType::Dir,
            mode: S_IFDIR | PERM_ALL,
            size: 1,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }

    pub fn file(size: u64, created: i64) -> Self {
        Self {
            kind: FileType::File,
            mode: S_IFREG | PERM_ALL,
            size,
            atime: created,
            mtime: created,
            ctime: created,
        }
    }

    pub fn from_record(record: &CachedFileRecord) -> Self {
        Self::file(record.size_bytes, record.timestamp)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Dir
    }
}

/// Snapshot of a directory's entries; consumed once.
#[derive(Debug)]
pub struct DirListing {
    entries: std::vec::IntoIter<String>,
}

impl DirListing {
    fn new(entries: Vec<String>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for DirListing {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// Directory creation. Nothing is written to the bucket; with `recursive`
/// the ancestors are walked up to the scheme root.
pub fn mkdir(uri: &str, recursive: bool) -> bool {
    let uri = uri.trim_end_matches('/');
    if recursive {
        let parent = path::dirname(uri);
        if !path::target(&parent).is_empty() && !mkdir(&parent, true) {
            return false;
        }
    }
    true
}

impl Gcsfs {
    /// `Ok(None)` means confirmed absent. A missing exact key on a
    /// file-looking path still reports a file so that callers can stat
    /// before creating. Its size is always 0: path-level stat sees no open
    /// handle, and a handle's buffered size is reported by
    /// `StreamHandle::stat`. `Err(_)` means the bucket could not be asked.
    pub async fn stat(&self, uri: &str) -> FsResult<Option<FileStat>> {
        let target = path::to_object_key(uri, true);
        if target.is_empty() {
            return Ok(Some(FileStat::directory()));
        }

        if self.config().cache_enabled {
            if let Some(record) = self.metadata().read(uri).await? {
                return Ok(Some(FileStat::from_record(&record)));
            }
        }

        if path::is_directory_like(uri) {
            let exists = self.client().has_prefix(&target).await?;
            debug!(uri, exists, "directory prefix check");
            return Ok(exists.then(FileStat::directory));
        }

        match self.client().head_object(&target).await? {
            Some(info) => {
                let record = CachedFileRecord::from_info(path::normalize_uri(uri), &info);
                let stat = FileStat::from_record(&record);
                if self.config().cache_enabled {
                    self.metadata().write(uri, record).await?;
                }
                Ok(Some(stat))
            }
            None => Ok(Some(FileStat::file(0, chrono::Utc::now().timestamp()))),
        }
    }

    pub async fn mkdir(&self, uri: &str, recursive: bool) -> FsResult<bool> {
        Ok(mkdir(uri, recursive))
    }

    /// Fails while anything other than a marker object lives under `uri`.
    pub async fn rmdir(&self, uri: &str) -> FsResult<bool> {
        let target = path::to_object_key(uri, true);
        if target.is_empty() {
            return Err(FsError::access(uri, "cannot remove the scheme root"));
        }
        if !self.client().remove_dir(&target).await? {
            warn!(uri, "rmdir refused, directory not empty");
            return Ok(false);
        }
        self.metadata().delete([uri]).await?;
        Ok(true)
    }

    /// Basenames of the immediate children of `uri`, files and directories.
    pub async fn list_directory(&self, uri: &str) -> FsResult<DirListing> {
        if !path::is_directory_like(uri) {
            return Err(FsError::NotADirectory {
                path: uri.to_string(),
            });
        }
        let target = path::to_object_key(uri, true);
        let prefix = if target.is_empty() {
            String::new()
        } else {
            format!("{target}/")
        };

        let listing = self.client().list_objects(&prefix, Some("/")).await?;
        let mut names: Vec<String> = listing
            .keys
            .iter()
            .filter(|k| **k != prefix)
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .map(str::to_string)
            .collect();
        names.extend(
            listing
                .common_prefixes
                .iter()
                .filter_map(|p| p.strip_prefix(prefix.as_str()))
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        );
        Ok(DirListing::new(names))
    }
}
