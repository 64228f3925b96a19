//! File nodes: range reads against the store, buffered writes, and
//! flush-triggered whole-object upload.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use object_store::Bucket;

use crate::database::Database;
use crate::fs::{DirectoryNode, FsError, NodeAttr, NodeKind};

/// Mutable state guarded by the per-node lock. A non-empty buffer means the
/// node is dirty.
struct FileState {
    /// Size of the last successfully uploaded object body.
    size: u64,
    modified: OffsetDateTime,
    /// Pending writes, owned exclusively until flush.
    buffer: Vec<u8>,
}

/// One object exposed as a regular file.
///
/// The backing store only supports whole-object replacement, so writes
/// accumulate in memory and a flush uploads the entire buffer. Concurrent
/// read/write/flush calls on the same node serialize on the state lock.
pub struct FileNode {
    key: String,
    bucket: Arc<dyn Bucket>,
    db: Database,
    /// Non-owning back-reference, used only for upward mtime notification.
    parent: Weak<DirectoryNode>,
    state: Mutex<FileState>,
}

impl FileNode {
    pub(crate) fn new(
        key: String,
        size: u64,
        modified: OffsetDateTime,
        bucket: Arc<dyn Bucket>,
        db: Database,
        parent: Weak<DirectoryNode>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            bucket,
            db,
            parent,
            state: Mutex::new(FileState {
                size,
                modified,
                buffer: Vec::new(),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Records the access in the metadata store. The adapter pairs this with
    /// a keep-cache hint so the kernel retains pages across closes and
    /// sequential re-reads skip redundant range downloads.
    pub async fn open(&self) -> Result<(), FsError> {
        debug!(key = %self.key, "file open");
        self.db.update_access(&self.key).await?;
        Ok(())
    }

    /// Reads up to `size` bytes at `offset`, clamped to the uploaded object
    /// size. An offset at or past the end returns empty bytes, not an error.
    pub async fn read(&self, offset: u64, size: u32) -> Result<Bytes, FsError> {
        let state = self.state.lock().await;

        let len = u64::from(size).min(state.size.saturating_sub(offset));
        debug!(key = %self.key, offset, requested = size, clamped = len, "file read");
        if len == 0 {
            return Ok(Bytes::new());
        }

        let body = self.bucket.get_range(&self.key, offset, len).await?;
        Ok(body)
    }

    /// Appends `data` to the pending buffer and marks the node dirty.
    ///
    /// The offset is accepted but not honored for seeking: whole-object PUT
    /// semantics make this an append-only accumulation model, not general
    /// random-access writing.
    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<u32, FsError> {
        let mut state = self.state.lock().await;
        debug!(key = %self.key, offset, len = data.len(), "file write");
        state.buffer.extend_from_slice(data);
        Ok(data.len() as u32)
    }

    /// Uploads the pending buffer as the new object body. A clean node is a
    /// no-op with zero uploads. On upload failure the buffer is preserved so
    /// a later flush can retry; nothing retries automatically.
    pub async fn flush(&self) -> Result<(), FsError> {
        let mut state = self.state.lock().await;

        if state.buffer.is_empty() {
            debug!(key = %self.key, "flush with empty buffer, nothing to upload");
            return Ok(());
        }

        debug!(key = %self.key, len = state.buffer.len(), "flush uploading buffer");
        let body = Bytes::copy_from_slice(&state.buffer);
        if let Err(err) = self.bucket.put(&self.key, body).await {
            warn!(key = %self.key, error = %err, "flush upload failed, keeping buffer");
            return Err(err.into());
        }

        state.size = state.buffer.len() as u64;
        state.buffer.clear();
        state.modified = OffsetDateTime::now_utc();
        drop(state);

        self.db.update_modified(&self.key).await?;
        if let Some(parent) = self.parent.upgrade() {
            parent.update_modified().await?;
        }
        Ok(())
    }

    /// Reported size is the pending buffer length while dirty, the uploaded
    /// object size otherwise.
    pub async fn getattr(&self) -> NodeAttr {
        let state = self.state.lock().await;
        let size = if state.buffer.is_empty() {
            state.size
        } else {
            state.buffer.len() as u64
        };
        NodeAttr {
            size,
            modified: state.modified,
            kind: NodeKind::File,
        }
    }
}
