//! Node-layer integration tests against an in-memory bucket.
//!
//! These cover the adaptation-layer contract: tree synthesis from flat
//! keys, clamped range reads, deferred create, flush-triggered upload, and
//! upward modification-time propagation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;

use object_store::{Bucket, Error as StoreError, MemoryBucket, ObjectMetadata};
use s3mount_daemon::fs::{build_tree, DirectoryNode, FsError, Node};
use s3mount_daemon::Database;

fn epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

/// Seed a memory bucket, build the tree, and hand back all three layers.
async fn setup(keys: &[(&str, Vec<u8>)]) -> (Arc<MemoryBucket>, Database, Arc<DirectoryNode>) {
    let bucket = Arc::new(MemoryBucket::new());
    for (key, data) in keys {
        bucket.insert(*key, data.clone(), epoch());
    }

    let db = Database::in_memory().await.unwrap();
    let dyn_bucket: Arc<dyn Bucket> = bucket.clone();
    let root = build_tree(dyn_bucket, db.clone()).await.unwrap();
    (bucket, db, root)
}

fn expect_dir(node: Node) -> Arc<DirectoryNode> {
    match node {
        Node::Directory(dir) => dir,
        Node::File(_) => panic!("expected directory"),
    }
}

#[tokio::test]
async fn tree_population_dedups_common_prefixes() {
    let (_bucket, _db, root) = setup(&[
        ("a/b/c.txt", b"1".to_vec()),
        ("a/b/d.txt", b"2".to_vec()),
        ("a/e.txt", b"3".to_vec()),
    ])
    .await;

    // Root has exactly one child: "a".
    assert_eq!(root.entries().await.len(), 1);
    let a = expect_dir(root.lookup("a").await.unwrap());
    assert_eq!(a.path(), "a");

    // "a" holds "b" and "e.txt"; "a/b" holds both files.
    let a_entries = a.entries().await;
    assert_eq!(a_entries.len(), 2);

    let b = expect_dir(a.lookup("b").await.unwrap());
    assert_eq!(b.path(), "a/b");
    assert!(b.lookup("c.txt").await.is_some());
    assert!(b.lookup("d.txt").await.is_some());
    assert!(a.lookup("e.txt").await.is_some());

    // Re-looking up "a" yields the same node, not a duplicate.
    let a_again = expect_dir(root.lookup("a").await.unwrap());
    assert!(Arc::ptr_eq(&a, &a_again));
}

#[tokio::test]
async fn directory_marker_keys_create_no_file_leaf() {
    let (_bucket, _db, root) = setup(&[("a/b/", Vec::new()), ("a/c.txt", b"x".to_vec())]).await;

    let a = expect_dir(root.lookup("a").await.unwrap());
    let b = expect_dir(a.lookup("b").await.unwrap());
    assert!(b.entries().await.is_empty());
    assert!(a.lookup("c.txt").await.is_some());
}

#[tokio::test]
async fn read_clamps_to_object_size() {
    let data: Vec<u8> = (0..100u8).collect();
    let (_bucket, _db, root) = setup(&[("file.bin", data.clone())]).await;

    let Some(Node::File(file)) = root.lookup("file.bin").await else {
        panic!("expected file");
    };

    // Ten bytes left past offset 90.
    let tail = file.read(90, 50).await.unwrap();
    assert_eq!(&tail[..], &data[90..]);

    // Offset past the end: zero bytes, no error.
    let empty = file.read(150, 10).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn write_then_flush_uploads_whole_buffer_once() {
    let (bucket, _db, root) = setup(&[]).await;

    let file = root.create_file("hello.txt").await.unwrap();

    // Create is a local placeholder: nothing is uploaded yet.
    assert_eq!(bucket.put_count(), 0);
    assert!(!bucket.contains("hello.txt"));
    assert_eq!(file.getattr().await.size, 0);

    file.write(0, b"hello").await.unwrap();
    file.flush().await.unwrap();

    assert_eq!(bucket.put_count(), 1);
    assert_eq!(file.getattr().await.size, 5);
    let body = bucket.get_range("hello.txt", 0, 5).await.unwrap();
    assert_eq!(&body[..], b"hello");

    // A second flush with a clean buffer performs zero additional uploads.
    file.flush().await.unwrap();
    assert_eq!(bucket.put_count(), 1);
}

#[tokio::test]
async fn dirty_buffer_is_reported_as_size() {
    let (_bucket, _db, root) = setup(&[]).await;

    let file = root.create_file("buf.txt").await.unwrap();
    file.write(0, b"abc").await.unwrap();
    file.write(0, b"de").await.unwrap();

    // Writes accumulate append-only; the dirty size is the buffer length.
    assert_eq!(file.getattr().await.size, 5);

    file.flush().await.unwrap();
    assert_eq!(file.getattr().await.size, 5);
}

#[tokio::test]
async fn flush_propagates_modified_time_upward() {
    let (_bucket, _db, root) = setup(&[("a/b/c.txt", b"old".to_vec())]).await;

    let a = expect_dir(root.lookup("a").await.unwrap());
    let b = expect_dir(a.lookup("b").await.unwrap());
    let Some(Node::File(file)) = b.lookup("c.txt").await else {
        panic!("expected file");
    };

    let root_before = root.getattr().await.modified;
    let a_before = a.getattr().await.modified;
    let b_before = b.getattr().await.modified;
    let file_before = file.getattr().await.modified;

    tokio::time::sleep(Duration::from_millis(20)).await;
    file.write(0, b"new contents").await.unwrap();
    file.flush().await.unwrap();

    assert!(file.getattr().await.modified > file_before);
    assert!(b.getattr().await.modified > b_before);
    assert!(a.getattr().await.modified > a_before);
    assert!(root.getattr().await.modified > root_before);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_creates_yield_single_child() {
    let (_bucket, _db, root) = setup(&[]).await;

    let r1 = root.clone();
    let r2 = root.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { r1.create_file("x").await }),
        tokio::spawn(async move { r2.create_file("x").await }),
    );

    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(root.entries().await.len(), 1);
}

#[tokio::test]
async fn unlink_removes_object_and_child() {
    let (bucket, _db, root) = setup(&[("gone.txt", b"x".to_vec())]).await;

    root.unlink("gone.txt").await.unwrap();

    assert!(!bucket.contains("gone.txt"));
    assert!(root.lookup("gone.txt").await.is_none());
}

#[tokio::test]
async fn unlink_of_missing_child_is_a_noop() {
    let (_bucket, _db, root) = setup(&[]).await;

    // Intended idempotence, not an oversight: missing children succeed.
    root.unlink("ghost").await.unwrap();
}

#[tokio::test]
async fn unlink_of_directory_child_is_rejected() {
    let (bucket, _db, root) = setup(&[("dir/inner.txt", b"x".to_vec())]).await;

    let err = root.unlink("dir").await.unwrap_err();
    assert!(matches!(err, FsError::IsDirectory));
    assert!(bucket.contains("dir/inner.txt"));
}

#[tokio::test]
async fn mkdir_registers_child_and_rejects_duplicates() {
    let (_bucket, db, root) = setup(&[]).await;

    let docs = root.mkdir("docs").await.unwrap();
    assert_eq!(docs.path(), "docs");

    // The path record exists with the directory's timestamp.
    assert_eq!(
        db.insert_path("docs").await.unwrap(),
        docs.getattr().await.modified
    );

    let err = root.mkdir("docs").await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists));
}

/// Bucket whose puts can be made to fail on demand.
struct FlakyBucket {
    inner: MemoryBucket,
    fail_puts: AtomicBool,
}

impl FlakyBucket {
    fn new() -> Self {
        Self {
            inner: MemoryBucket::new(),
            fail_puts: AtomicBool::new(false),
        }
    }

    fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Bucket for FlakyBucket {
    async fn list(&self) -> object_store::Result<Vec<ObjectMetadata>> {
        self.inner.list().await
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> object_store::Result<Bytes> {
        self.inner.get_range(key, offset, len).await
    }

    async fn put(&self, key: &str, body: Bytes) -> object_store::Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected put failure".to_string()));
        }
        self.inner.put(key, body).await
    }

    async fn delete(&self, key: &str) -> object_store::Result<()> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn failed_flush_preserves_buffer_for_retry() {
    let bucket = Arc::new(FlakyBucket::new());
    let db = Database::in_memory().await.unwrap();
    let dyn_bucket: Arc<dyn Bucket> = bucket.clone();
    let root = build_tree(dyn_bucket, db).await.unwrap();

    let file = root.create_file("retry.txt").await.unwrap();
    file.write(0, b"data").await.unwrap();

    bucket.set_fail_puts(true);
    let err = file.flush().await.unwrap_err();
    assert!(matches!(err, FsError::Store(_)));

    // The buffer survived the failure; a later flush retries the upload.
    assert_eq!(file.getattr().await.size, 4);
    bucket.set_fail_puts(false);
    file.flush().await.unwrap();

    let body = bucket.inner.get_range("retry.txt", 0, 4).await.unwrap();
    assert_eq!(&body[..], b"data");
    assert_eq!(file.getattr().await.size, 4);
}
