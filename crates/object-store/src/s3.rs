//! S3-backed bucket gateway built on aws-sdk-s3.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::{Bucket, ObjectMetadata};

/// Sub-range size for fan-out downloads. Ranges at or below this size are
/// fetched with a single request.
const PART_SIZE: u64 = 8 * 1024 * 1024;

/// Bucket gateway backed by a real S3 (or S3-compatible) endpoint.
///
/// Large range reads are split into [`PART_SIZE`] sub-ranges fetched with
/// bounded concurrency and reassembled in order.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    client: Client,
    bucket: String,
    concurrency: usize,
}

impl S3Bucket {
    pub fn new(client: Client, bucket: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Builds a gateway from the ambient AWS configuration chain
    /// (environment, profile, instance metadata).
    pub async fn from_env(bucket: impl Into<String>, concurrency: usize) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(Client::new(&config), bucket, concurrency)
    }

    async fn fetch_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|err| Error::backend(DisplayErrorContext(&err)))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|err| Error::backend(DisplayErrorContext(&err)))?;
        Ok(body.into_bytes())
    }
}

#[async_trait]
impl Bucket for S3Bucket {
    async fn list(&self) -> Result<Vec<ObjectMetadata>> {
        debug!(bucket = %self.bucket, "list objects");

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| Error::backend(DisplayErrorContext(&err)))?;

            for object in resp.contents() {
                let Some(key) = object.key() else { continue };
                let last_modified = object
                    .last_modified()
                    .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts.secs()).ok())
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH);
                objects.push(ObjectMetadata {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                });
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(bucket = %self.bucket, count = objects.len(), "listing complete");
        Ok(objects)
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        debug!(key, offset, len, "get range");

        if len == 0 {
            return Ok(Bytes::new());
        }
        let end = offset + len - 1;

        let body = if len <= PART_SIZE {
            self.fetch_range(key, offset, end).await?
        } else {
            let parts: Vec<(u64, u64)> = (offset..=end)
                .step_by(PART_SIZE as usize)
                .map(|start| (start, end.min(start + PART_SIZE - 1)))
                .collect();

            let chunks: Vec<Bytes> = stream::iter(parts)
                .map(|(start, stop)| self.fetch_range(key, start, stop))
                .buffered(self.concurrency)
                .try_collect()
                .await?;

            let mut assembled = BytesMut::with_capacity(len as usize);
            for chunk in &chunks {
                assembled.extend_from_slice(chunk);
            }
            assembled.freeze()
        };

        if body.len() as u64 != len {
            return Err(Error::ShortRead {
                key: key.to_string(),
                wanted: len,
                got: body.len() as u64,
            });
        }
        Ok(body)
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(key, len = body.len(), "put object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| Error::backend(DisplayErrorContext(&err)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key, "delete object");

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| Error::backend(DisplayErrorContext(&err)))?;
        Ok(())
    }
}
