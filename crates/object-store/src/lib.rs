//! Object store gateway for s3mount.
//!
//! Normalizes list/range-get/put/delete against a flat key→blob backend.
//! The gateway owns listing pagination and byte-range construction; it does
//! not retry or back off, so a single failed call surfaces immediately to
//! whatever filesystem operation triggered it.
//!
//! Two implementations are provided:
//!
//! - [`S3Bucket`]: aws-sdk-s3 backed, with parallel sub-range fan-out for
//!   large reads
//! - [`MemoryBucket`]: in-memory store for tests and local development

mod error;
mod memory;
mod s3;

pub use error::{Error, Result};
pub use memory::MemoryBucket;
pub use s3::S3Bucket;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

/// Metadata for one stored object, as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Flat object key, slash-delimited by convention.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time reported by the store.
    pub last_modified: OffsetDateTime,
}

/// Bucket-scoped access to a flat key→blob store.
///
/// The store has whole-object PUT semantics: no append, no partial update,
/// no rename. Credential, region, and endpoint resolution belong to the
/// concrete implementation, not to callers.
#[async_trait]
pub trait Bucket: Send + Sync + 'static {
    /// Lists every object in the bucket, following continuation cursors
    /// until the listing is exhausted. Fails fast on the first page error;
    /// there is no partial-success contract.
    async fn list(&self) -> Result<Vec<ObjectMetadata>>;

    /// Fetches the byte range `[offset, offset + len - 1]` of an object.
    /// Returns exactly `len` bytes or an error.
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes>;

    /// Replaces the object wholesale with `body`.
    async fn put(&self, key: &str, body: Bytes) -> Result<()>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
