use anyhow::{Result, anyhow};
use async_trait::async_trait;
use gcsfs::cadapter::localfs::LocalFsBackend;
use gcsfs::cadapter::{ObjectBackend, ObjectInfo, ObjectListing};
use gcsfs::meta::{CachedFileRecord, InMemoryRecordStore, MetaError, RecordStore};
use gcsfs::vfs::FileType;
use gcsfs::{FsError, Gcsfs, GcsfsConfig, OpenMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Local directory bucket whose individual operations can be made to fail.
struct FlakyBackend {
    inner: LocalFsBackend,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
    fail_head: AtomicBool,
    fail_list: AtomicBool,
}

#[async_trait]
impl ObjectBackend for FlakyBackend {
    async fn put_object(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(anyhow!("injected put failure"));
        }
        self.inner.put_object(key, data, content_type).await
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_object(key).await
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectInfo>> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(anyhow!("injected head failure"));
        }
        self.inner.head_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("injected delete failure"));
        }
        self.inner.delete_object(key).await
    }

    async fn list_objects(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("injected list failure"));
        }
        self.inner.list_objects(prefix, delimiter).await
    }
}

/// Record store that counts lookups and answers slowly.
struct CountingStore {
    inner: InMemoryRecordStore,
    selects: AtomicUsize,
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn select(&self, uri: &str) -> Result<Option<CachedFileRecord>, MetaError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.select(uri).await
    }

    async fn upsert(&self, record: &CachedFileRecord) -> Result<(), MetaError> {
        self.inner.upsert(record).await
    }

    async fn delete_many(&self, uris: &[String]) -> Result<u64, MetaError> {
        self.inner.delete_many(uris).await
    }
}

struct Harness {
    fs: Gcsfs,
    backend: Arc<FlakyBackend>,
    _dir: TempDir,
}

fn config() -> GcsfsConfig {
    GcsfsConfig {
        scheme: "public".into(),
        bucket_name: "site-files".into(),
        ..Default::default()
    }
}

fn harness_with_store(store: Arc<dyn RecordStore>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FlakyBackend {
        inner: LocalFsBackend::new(dir.path()),
        fail_put: AtomicBool::new(false),
        fail_delete: AtomicBool::new(false),
        fail_head: AtomicBool::new(false),
        fail_list: AtomicBool::new(false),
    });
    let fs = Gcsfs::with_backend(Arc::new(config()), backend.clone(), store);
    Harness {
        fs,
        backend,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(InMemoryRecordStore::new()))
}

async fn write_file(fs: &Gcsfs, uri: &str, data: &[u8]) {
    let mut handle = fs.open(uri, OpenMode::Write).await.unwrap();
    assert_eq!(handle.write(data).unwrap(), data.len());
    handle.flush().await.unwrap();
    assert_eq!(handle.bytes_written(), data.len() as u64);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_write_flush_then_stat() {
    let h = harness();
    write_file(&h.fs, "public://foo/bar.txt", &[7u8; 1024]).await;

    let record = h.fs.metadata().read("public://foo/bar.txt").await.unwrap().unwrap();
    assert_eq!(record.size_bytes, 1024);
    assert_eq!(record.content_type, "text/plain");

    let stat = h.fs.stat("public://foo/bar.txt").await.unwrap().unwrap();
    assert_eq!(stat.kind, FileType::File);
    assert_eq!(stat.mode, 0o100777);
    assert_eq!(stat.size, 1024);

    let mut handle = h.fs.open("public:///foo/bar.txt/", OpenMode::Read).await.unwrap();
    let data = handle.read_to_end().unwrap();
    assert_eq!(data.len(), 1024);
    assert!(handle.eof());
}

#[tokio::test]
async fn test_mkdir_creates_nothing_and_stat_misses() {
    let h = harness();
    assert!(h.fs.mkdir("public://a/b/c", true).await.unwrap());
    assert!(h.fs.client().list_objects("", None).await.unwrap().is_empty());
    assert_eq!(h.fs.stat("public://a/b/c").await.unwrap(), None);

    write_file(&h.fs, "public://a/b/c/d.txt", b"x").await;
    let stat = h.fs.stat("public://a/b/c").await.unwrap().unwrap();
    assert!(stat.is_dir());
    assert_eq!(stat.mode, 0o040777);

    assert!(h.fs.stat("public://").await.unwrap().unwrap().is_dir());
}

#[tokio::test]
async fn test_stat_of_missing_file_key_reports_writable_file() {
    let h = harness();
    let stat = h.fs.stat("public://not/yet/here.png").await.unwrap().unwrap();
    assert_eq!(stat.kind, FileType::File);
    assert_eq!(stat.size, 0);
    // the quirk does not fabricate a cache record
    assert!(h.fs.get_file_info("public://not/yet/here.png").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_preserves_metadata() {
    let h = harness();
    write_file(&h.fs, "public://a.txt", b"hello world").await;
    let before = h.fs.metadata().read("public://a.txt").await.unwrap().unwrap();

    assert!(h.fs.rename("public://a.txt", "public://moved/b.txt").await.unwrap());

    let after = h.fs.metadata().read("public://moved/b.txt").await.unwrap().unwrap();
    assert_eq!(after.size_bytes, before.size_bytes);
    assert_eq!(after.uri, "public://moved/b.txt");
    assert!(h.fs.metadata().read("public://a.txt").await.unwrap().is_none());

    assert!(!h.fs.client().exists("a.txt").await.unwrap());
    assert!(h.fs.client().exists("moved/b.txt").await.unwrap());
}

#[tokio::test]
async fn test_rename_of_missing_source_fails() {
    let h = harness();
    let err = h.fs.rename("public://nope.txt", "public://b.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_missing_reads_query_store_once() {
    let store = Arc::new(CountingStore {
        inner: InMemoryRecordStore::new(),
        selects: AtomicUsize::new(0),
    });
    let h = harness_with_store(store.clone());

    let (a, b) = tokio::join!(
        h.fs.metadata().read("public://missing.txt"),
        h.fs.metadata().read("public://missing.txt"),
    );
    assert!(a.unwrap().is_none());
    assert!(b.unwrap().is_none());
    assert_eq!(store.selects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unlink_keeps_cache_when_remote_delete_fails() {
    let h = harness();
    write_file(&h.fs, "public://keep.txt", b"data").await;

    h.backend.fail_delete.store(true, Ordering::SeqCst);
    let err = h.fs.unlink("public://keep.txt").await.unwrap_err();
    assert!(matches!(err, FsError::Io(_)));
    assert!(h.fs.metadata().read("public://keep.txt").await.unwrap().is_some());

    h.backend.fail_delete.store(false, Ordering::SeqCst);
    assert!(h.fs.unlink("public://keep.txt").await.unwrap());
    assert!(h.fs.metadata().read("public://keep.txt").await.unwrap().is_none());
    // unlinking again is not an error
    assert!(h.fs.unlink("public://keep.txt").await.unwrap());
}

#[tokio::test]
async fn test_failed_flush_caches_nothing() {
    let h = harness();
    h.backend.fail_put.store(true, Ordering::SeqCst);

    let mut handle = h.fs.open("public://lost.txt", OpenMode::Write).await.unwrap();
    handle.write(b"never stored").unwrap();
    assert!(handle.flush().await.is_err());
    assert!(handle.is_closed());
    assert!(handle.write(b"more").is_err());

    assert!(h.fs.metadata().read("public://lost.txt").await.unwrap().is_none());
    assert!(!h.fs.client().exists("lost.txt").await.unwrap());
}

#[tokio::test]
async fn test_open_modes() {
    let h = harness();
    let err = h.fs.open("public://absent.txt", OpenMode::Read).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        h.fs.open("public://", OpenMode::Write).await.unwrap_err(),
        FsError::Open { .. }
    ));

    write_file(&h.fs, "public://log.txt", b"one,").await;
    assert!(matches!(
        h.fs.open("public://log.txt", OpenMode::CreateNew).await.unwrap_err(),
        FsError::Open { .. }
    ));

    let mut handle = h.fs.open("public://log.txt", OpenMode::Append).await.unwrap();
    handle.write(b"two").unwrap();
    assert_eq!(handle.stat().size, 7);
    assert!(!handle.lock());
    assert!(!handle.truncate(0));
    handle.close().await.unwrap();

    let record = h.fs.get_file_info("public://log.txt").await.unwrap().unwrap();
    assert_eq!(record.size_bytes, 7);

    let mut reader = h.fs.open("public://log.txt", OpenMode::Read).await.unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"one,");
    assert!(reader.write(b"x").is_err());
    assert_eq!(&reader.read_to_end().unwrap()[..], b"two");
}

#[tokio::test]
async fn test_list_and_rmdir() {
    let h = harness();
    write_file(&h.fs, "public://docs/a.txt", b"a").await;
    write_file(&h.fs, "public://docs/b.pdf", b"b").await;
    write_file(&h.fs, "public://docs/img/c.png", b"c").await;
    h.fs.client().put_object("docs/empty/", b"", None).await.unwrap();

    let mut names: Vec<String> = h.fs.list_directory("public://docs").await.unwrap().collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.pdf", "empty", "img"]);

    assert!(matches!(
        h.fs.list_directory("public://docs/a.txt").await.unwrap_err(),
        FsError::NotADirectory { .. }
    ));

    assert!(!h.fs.rmdir("public://docs").await.unwrap());
    assert!(h.fs.rmdir("public://docs/empty").await.unwrap());
    assert!(matches!(
        h.fs.rmdir("public://").await.unwrap_err(),
        FsError::Access { .. }
    ));
}

#[tokio::test]
async fn test_rename_onto_itself_requires_source() {
    let h = harness();
    let err = h.fs.rename("public://ghost.txt", "public:///ghost.txt/").await.unwrap_err();
    assert!(err.is_not_found());

    write_file(&h.fs, "public://here.txt", b"x").await;
    assert!(h.fs.rename("public://here.txt", "public://here.txt").await.unwrap());
    assert!(h.fs.client().exists("here.txt").await.unwrap());
}

#[tokio::test]
async fn test_failed_copy_leaves_source_and_cache() {
    let h = harness();
    write_file(&h.fs, "public://src.txt", b"payload").await;

    h.backend.fail_put.store(true, Ordering::SeqCst);
    let err = h.fs.rename("public://src.txt", "public://dst.txt").await.unwrap_err();
    assert!(matches!(err, FsError::Io(_)));

    assert!(h.fs.client().exists("src.txt").await.unwrap());
    assert!(!h.fs.client().exists("dst.txt").await.unwrap());
    let record = h.fs.metadata().read("public://src.txt").await.unwrap().unwrap();
    assert_eq!(record.size_bytes, 7);
    assert!(h.fs.metadata().read("public://dst.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_with_undeletable_source_refreshes_destination() {
    let h = harness();
    write_file(&h.fs, "public://src.txt", &[1u8; 100]).await;
    write_file(&h.fs, "public://dst.txt", b"old").await;
    assert_eq!(h.fs.stat("public://dst.txt").await.unwrap().unwrap().size, 3);

    h.backend.fail_delete.store(true, Ordering::SeqCst);
    let err = h.fs.rename("public://src.txt", "public://dst.txt").await.unwrap_err();
    assert!(matches!(err, FsError::Io(_)));

    // the copy landed, so stat must see the new destination contents
    let remote = h.fs.client().head_object("dst.txt").await.unwrap().unwrap();
    assert_eq!(remote.size, 100);
    assert_eq!(h.fs.stat("public://dst.txt").await.unwrap().unwrap().size, 100);

    // the source is still there and keeps its record
    assert!(h.fs.client().exists("src.txt").await.unwrap());
    let record = h.fs.metadata().read("public://src.txt").await.unwrap().unwrap();
    assert_eq!(record.size_bytes, 100);
}

#[tokio::test]
async fn test_io_failure_is_not_absence() {
    let h = harness();
    h.backend.fail_list.store(true, Ordering::SeqCst);
    h.backend.fail_head.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.fs.stat("public://some/dir").await.unwrap_err(),
        FsError::Io(_)
    ));
    assert!(matches!(
        h.fs.stat("public://some/file.txt").await.unwrap_err(),
        FsError::Io(_)
    ));
    assert!(matches!(
        h.fs.get_file_info("public://some/file.txt").await.unwrap_err(),
        FsError::Io(_)
    ));

    h.backend.fail_list.store(false, Ordering::SeqCst);
    h.backend.fail_head.store(false, Ordering::SeqCst);
    assert_eq!(h.fs.stat("public://some/dir").await.unwrap(), None);
    assert!(h.fs.get_file_info("public://some/file.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rmdir_drops_cached_record() {
    let h = harness();
    h.fs.client().put_object("gallery/", b"", None).await.unwrap();
    h.fs
        .metadata()
        .write(
            "public://gallery",
            CachedFileRecord::new("public://gallery", 0, "application/octet-stream"),
        )
        .await
        .unwrap();
    assert!(h.fs.metadata().read("public://gallery").await.unwrap().is_some());

    assert!(h.fs.rmdir("public://gallery").await.unwrap());
    assert!(h.fs.metadata().read("public://gallery").await.unwrap().is_none());
    assert!(!h.fs.client().exists("gallery/").await.unwrap());
}
