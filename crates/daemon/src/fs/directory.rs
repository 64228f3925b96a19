//! Synthesized directory nodes: child management and upward modification
//! time propagation.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use object_store::{Bucket, ObjectMetadata};

use crate::database::Database;
use crate::fs::{join_path, FileNode, FsError, Node, NodeAttr, NodeKind};

/// One synthesized folder. Nothing like it exists in the object store; it is
/// materialized from key prefixes and its timestamps live in the metadata
/// store.
pub struct DirectoryNode {
    /// Slash-delimited path; empty for the mount root.
    path: String,
    bucket: Arc<dyn Bucket>,
    db: Database,
    /// Non-owning back-reference, used only for upward mtime notification.
    /// Dangling (all upgrades fail) on the root.
    parent: Weak<DirectoryNode>,
    modified: Mutex<OffsetDateTime>,
    /// Child map; the lock also serializes create/mkdir/unlink on this
    /// directory so racing calls cannot duplicate entries.
    children: Mutex<HashMap<String, Node>>,
}

impl std::fmt::Debug for DirectoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryNode")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DirectoryNode {
    /// Creates the mount root. The empty path gets a record too, so the root
    /// keeps a stable timestamp across remounts.
    pub async fn root(bucket: Arc<dyn Bucket>, db: Database) -> Result<Arc<Self>, FsError> {
        let modified = db.insert_path("").await?;
        Ok(Arc::new(Self {
            path: String::new(),
            bucket,
            db,
            parent: Weak::new(),
            modified: Mutex::new(modified),
            children: Mutex::new(HashMap::new()),
        }))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<Arc<DirectoryNode>> {
        self.parent.upgrade()
    }

    pub async fn getattr(&self) -> NodeAttr {
        NodeAttr {
            size: 0,
            modified: *self.modified.lock().await,
            kind: NodeKind::Directory,
        }
    }

    pub async fn lookup(&self, name: &str) -> Option<Node> {
        self.children.lock().await.get(name).cloned()
    }

    /// Snapshot of the child map for directory listings.
    pub async fn entries(&self) -> Vec<(String, Node)> {
        self.children
            .lock()
            .await
            .iter()
            .map(|(name, node)| (name.clone(), node.clone()))
            .collect()
    }

    /// Creates a zero-size file child. The backing object is not written
    /// until the first flush; create is purely a local placeholder.
    ///
    /// Racing creates of the same name converge on a single child: the lock
    /// is held across registration, and an existing file is returned rather
    /// than replaced.
    pub async fn create_file(self: &Arc<Self>, name: &str) -> Result<Arc<FileNode>, FsError> {
        let mut children = self.children.lock().await;
        match children.get(name) {
            Some(Node::File(file)) => return Ok(file.clone()),
            Some(Node::Directory(_)) => return Err(FsError::IsDirectory),
            None => {}
        }

        let key = join_path(&self.path, name);
        debug!(key = %key, "directory create");
        let modified = self.db.insert_path(&key).await?;
        let file = FileNode::new(
            key,
            0,
            modified,
            self.bucket.clone(),
            self.db.clone(),
            Arc::downgrade(self),
        );
        children.insert(name.to_string(), Node::File(file.clone()));
        Ok(file)
    }

    /// Creates and attaches a new directory child.
    pub async fn mkdir(self: &Arc<Self>, name: &str) -> Result<Arc<DirectoryNode>, FsError> {
        let mut children = self.children.lock().await;
        if children.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }

        let dir = self.new_child_dir(name).await?;
        children.insert(name.to_string(), Node::Directory(dir.clone()));
        Ok(dir)
    }

    /// Mount-time variant of mkdir with get-or-create semantics, so common
    /// key prefixes produce exactly one node.
    pub async fn ensure_dir(self: &Arc<Self>, name: &str) -> Result<Arc<DirectoryNode>, FsError> {
        let mut children = self.children.lock().await;
        match children.get(name) {
            Some(Node::Directory(dir)) => return Ok(dir.clone()),
            Some(Node::File(_)) => return Err(FsError::NotDirectory),
            None => {}
        }

        let dir = self.new_child_dir(name).await?;
        children.insert(name.to_string(), Node::Directory(dir.clone()));
        Ok(dir)
    }

    async fn new_child_dir(self: &Arc<Self>, name: &str) -> Result<Arc<DirectoryNode>, FsError> {
        let path = join_path(&self.path, name);
        // First write wins: a remount gets the stored timestamp back instead
        // of resetting it.
        let modified = self.db.insert_path(&path).await?;
        debug!(path = %path, %modified, "creating directory node");

        Ok(Arc::new(Self {
            path,
            bucket: self.bucket.clone(),
            db: self.db.clone(),
            parent: Arc::downgrade(self),
            modified: Mutex::new(modified),
            children: Mutex::new(HashMap::new()),
        }))
    }

    /// Attaches a file leaf for an object reported by the mount-time
    /// listing. Re-encountering a key reuses the existing node.
    pub async fn attach_file(
        self: &Arc<Self>,
        name: &str,
        object: &ObjectMetadata,
    ) -> Result<Arc<FileNode>, FsError> {
        let mut children = self.children.lock().await;
        if let Some(Node::File(file)) = children.get(name) {
            return Ok(file.clone());
        }

        self.db.insert_path(&object.key).await?;
        let file = FileNode::new(
            object.key.clone(),
            object.size,
            object.last_modified,
            self.bucket.clone(),
            self.db.clone(),
            Arc::downgrade(self),
        );
        children.insert(name.to_string(), Node::File(file.clone()));
        Ok(file)
    }

    /// Deletes the backing object and detaches the child.
    ///
    /// A missing child is success, not an error: unlink is idempotent here,
    /// matching the at-most-once delete the store offers. Directory children
    /// are rejected; directory removal is not supported.
    pub async fn unlink(&self, name: &str) -> Result<(), FsError> {
        let mut children = self.children.lock().await;
        let target = children.get(name).cloned();
        match target {
            None => {
                warn!(path = %self.path, name, "unlink of missing child");
                Ok(())
            }
            Some(Node::Directory(_)) => Err(FsError::IsDirectory),
            Some(Node::File(file)) => {
                debug!(key = %file.key(), "directory unlink");
                self.bucket.delete(file.key()).await?;
                children.remove(name);
                Ok(())
            }
        }
    }

    /// Stamps this directory and every ancestor up to the root, mirroring
    /// ordinary filesystem semantics where a child mutation advances the
    /// mtime of enclosing directories.
    pub async fn update_modified(self: &Arc<Self>) -> Result<(), FsError> {
        let mut current = Some(self.clone());
        while let Some(dir) = current {
            debug!(path = %dir.path, "updating modified time");
            dir.db.update_modified(&dir.path).await?;
            *dir.modified.lock().await = OffsetDateTime::now_utc();
            current = dir.parent.upgrade();
        }
        Ok(())
    }
}
