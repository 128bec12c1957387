//! Per-open-handle stream state.
//!
//! Objects are written whole: a writing handle buffers everything and
//! `flush` uploads the full buffer. Reading handles fetch the object once
//! at open time.

use crate::meta::record::CachedFileRecord;
use crate::vfs::dir::FileStat;
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::fs::Gcsfs;
use crate::vfs::path;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Truncate, or create.
    Write,
    Append,
    /// Fails if the object already exists.
    CreateNew,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl FromStr for OpenMode {
    type Err = String;

    /// Accepts fopen-style modes; `b`/`t` flags are ignored and read-write
    /// (`+`) is not supported by an object store.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let base: String = s.chars().filter(|c| !matches!(c, 'b' | 't')).collect();
        match base.as_str() {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "a" => Ok(OpenMode::Append),
            "x" => Ok(OpenMode::CreateNew),
            _ => Err(format!("unsupported open mode `{s}`")),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
            OpenMode::CreateNew => "x",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Reading,
    Writing,
    Closed,
}

pub struct StreamHandle {
    fs: Gcsfs,
    uri: String,
    key: String,
    mode: OpenMode,
    state: StreamState,
    data: Bytes,
    position: usize,
    buffer: Vec<u8>,
    bytes_written: u64,
    dirty: bool,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("uri", &self.uri)
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

impl Gcsfs {
    pub async fn open(&self, uri: &str, mode: OpenMode) -> FsResult<StreamHandle> {
        let key = path::to_object_key(uri, true);
        if key.is_empty() {
            return Err(FsError::open(uri, "empty object key"));
        }
        debug!(uri, key = %key, %mode, "open");

        let mut handle = StreamHandle {
            fs: self.clone(),
            uri: path::normalize_uri(uri),
            key,
            mode,
            state: StreamState::Writing,
            data: Bytes::new(),
            position: 0,
            buffer: Vec::new(),
            bytes_written: 0,
            dirty: false,
        };

        match mode {
            OpenMode::Read => {
                let data = self
                    .client()
                    .get_object(&handle.key)
                    .await?
                    .ok_or_else(|| FsError::not_found(uri))?;
                handle.data = Bytes::from(data);
                handle.state = StreamState::Reading;
            }
            OpenMode::Write => {
                // truncation is observable once flushed
                handle.dirty = true;
            }
            OpenMode::Append => {
                if let Some(existing) = self.client().get_object(&handle.key).await? {
                    handle.buffer = existing;
                }
            }
            OpenMode::CreateNew => {
                if self.client().exists(&handle.key).await? {
                    return Err(FsError::open(uri, "object already exists"));
                }
                handle.dirty = true;
            }
        }
        Ok(handle)
    }
}

impl StreamHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    fn ensure_state(&self, want: StreamState) -> FsResult<()> {
        match self.state {
            s if s == want => Ok(()),
            StreamState::Closed => Err(FsError::open(&self.uri, "stream is closed")),
            StreamState::Reading => Err(FsError::access(&self.uri, "stream is read-only")),
            StreamState::Writing => Err(FsError::access(&self.uri, "stream is write-only")),
        }
    }

    /// Buffers `data`; nothing reaches the bucket before `flush`.
    pub fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        self.ensure_state(StreamState::Writing)?;
        self.buffer.extend_from_slice(data);
        self.bytes_written += data.len() as u64;
        self.dirty = true;
        Ok(data.len())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        self.ensure_state(StreamState::Reading)?;
        let remaining = &self.data[self.position.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }

    pub fn read_to_end(&mut self) -> FsResult<Bytes> {
        self.ensure_state(StreamState::Reading)?;
        let start = self.position.min(self.data.len());
        self.position = self.data.len();
        Ok(self.data.slice(start..))
    }

    pub fn eof(&self) -> bool {
        self.state != StreamState::Reading || self.position >= self.data.len()
    }

    /// Uploads the buffered object and refreshes its cached record.
    ///
    /// On upload failure the handle is closed and the cache is left as it
    /// was. A read handle has nothing to flush.
    pub async fn flush(&mut self) -> FsResult<()> {
        match self.state {
            StreamState::Reading => return Ok(()),
            StreamState::Closed => return Err(FsError::open(&self.uri, "stream is closed")),
            StreamState::Writing => {}
        }

        let content_type = path::guess_content_type(&self.key);
        let client = self.fs.client();
        if let Err(e) = client
            .put_object(&self.key, &self.buffer, Some(content_type))
            .await
        {
            error!(uri = %self.uri, error = %e, "flush failed, data not committed");
            self.state = StreamState::Closed;
            return Err(FsError::Io(e));
        }
        self.dirty = false;

        let meta = self.fs.metadata();
        meta.invalidate(&self.uri).await;
        let record = match client.head_object(&self.key).await {
            Ok(Some(info)) => CachedFileRecord::from_info(self.uri.as_str(), &info),
            Ok(None) => {
                CachedFileRecord::new(self.uri.as_str(), self.buffer.len() as u64, content_type)
            }
            Err(e) => {
                warn!(uri = %self.uri, error = %e, "head after flush failed, using buffered size");
                CachedFileRecord::new(self.uri.as_str(), self.buffer.len() as u64, content_type)
            }
        };
        meta.write(&self.uri, record).await?;
        debug!(uri = %self.uri, size = self.buffer.len(), "flushed");
        Ok(())
    }

    /// Flushes pending writes, then closes.
    pub async fn close(mut self) -> FsResult<()> {
        let result = if self.dirty {
            self.flush().await
        } else {
            Ok(())
        };
        self.state = StreamState::Closed;
        result
    }

    /// Stat of the open handle; the size is what is currently buffered.
    pub fn stat(&self) -> FileStat {
        let size = match self.state {
            StreamState::Reading => self.data.len(),
            _ => self.buffer.len(),
        };
        FileStat::file(size as u64, chrono::Utc::now().timestamp())
    }

    /// Advisory locking is not supported.
    pub fn lock(&self) -> bool {
        false
    }

    /// Truncation is not supported.
    pub fn truncate(&mut self, _size: u64) -> bool {
        false
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.dirty && self.state == StreamState::Writing {
            warn!(uri = %self.uri, "stream dropped with unflushed data");
        }
    }
}
