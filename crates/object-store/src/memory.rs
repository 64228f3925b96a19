//! In-memory bucket used by tests and local development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::{Bucket, ObjectMetadata};

struct StoredObject {
    data: Bytes,
    last_modified: OffsetDateTime,
}

/// In-memory `Bucket` with the same contract as the S3 gateway.
///
/// Tracks the number of successful puts so callers can assert on upload
/// counts.
#[derive(Default)]
pub struct MemoryBucket {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    puts: AtomicU64,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without counting it as a put, with an explicit
    /// modification time. Useful for pre-populating listings.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, last_modified: OffsetDateTime) {
        self.objects.write().insert(
            key.into(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    /// Number of successful `put` calls since construction.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn list(&self) -> Result<Vec<ObjectMetadata>> {
        Ok(self
            .objects
            .read()
            .iter()
            .map(|(key, object)| ObjectMetadata {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        let objects = self.objects.read();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        let size = object.data.len() as u64;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or(Error::InvalidRange {
                key: key.to_string(),
                offset,
                len,
                size,
            })?;
        Ok(object.data.slice(offset as usize..end as usize))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<()> {
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: body,
                last_modified: OffsetDateTime::now_utc(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // Matches S3: deleting a missing key succeeds.
        self.objects.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let bucket = MemoryBucket::new();
        bucket.put("a/b.txt", Bytes::from_static(b"hello")).await.unwrap();

        let body = bucket.get_range("a/b.txt", 0, 5).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(bucket.put_count(), 1);
    }

    #[tokio::test]
    async fn get_range_slices_middle() {
        let bucket = MemoryBucket::new();
        bucket.insert("k", &b"0123456789"[..], OffsetDateTime::UNIX_EPOCH);

        let body = bucket.get_range("k", 3, 4).await.unwrap();
        assert_eq!(&body[..], b"3456");
    }

    #[tokio::test]
    async fn get_range_past_end_is_error() {
        let bucket = MemoryBucket::new();
        bucket.insert("k", &b"01234"[..], OffsetDateTime::UNIX_EPOCH);

        let err = bucket.get_range("k", 3, 4).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn get_range_missing_key() {
        let bucket = MemoryBucket::new();
        let err = bucket.get_range("ghost", 0, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_reports_sizes_and_keys() {
        let bucket = MemoryBucket::new();
        bucket.insert("b", &b"xy"[..], OffsetDateTime::UNIX_EPOCH);
        bucket.insert("a", &b"x"[..], OffsetDateTime::UNIX_EPOCH);

        let objects = bucket.list().await.unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "a");
        assert_eq!(objects[0].size, 1);
        assert_eq!(objects[1].key, "b");
        assert_eq!(objects[1].size, 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let bucket = MemoryBucket::new();
        bucket.insert("k", &b"x"[..], OffsetDateTime::UNIX_EPOCH);

        bucket.delete("k").await.unwrap();
        assert!(!bucket.contains("k"));
        bucket.delete("k").await.unwrap();
    }
}
