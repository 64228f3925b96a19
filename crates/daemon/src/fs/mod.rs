//! In-memory node tree synthesized from flat object keys.
//!
//! The object store has no native directories; this module builds them. A
//! [`DirectoryNode`] owns a name→node map and propagates modification times
//! upward through non-owning parent back-references; a [`FileNode`] fronts
//! one object with range reads and a buffered, flush-triggered upload.
//! [`build_tree`] runs once at mount time and turns a full listing into the
//! tree.
//!
//! Each path maps to at most one live node for the mount's lifetime, which
//! is what gives the kernel stable node identity.

mod directory;
mod error;
mod file;
mod tree;

pub use directory::DirectoryNode;
pub use error::FsError;
pub use file::FileNode;
pub use tree::build_tree;

use std::sync::Arc;

use time::OffsetDateTime;

/// One live filesystem entry. Cloning shares the underlying node.
#[derive(Clone)]
pub enum Node {
    File(Arc<FileNode>),
    Directory(Arc<DirectoryNode>),
}

impl Node {
    /// Flat object key for files, synthesized path for directories. The
    /// mount root is the empty path.
    pub fn path(&self) -> String {
        match self {
            Node::File(file) => file.key().to_string(),
            Node::Directory(dir) => dir.path().to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub async fn getattr(&self) -> NodeAttr {
        match self {
            Node::File(file) => file.getattr().await,
            Node::Directory(dir) => dir.getattr().await,
        }
    }
}

/// Point-in-time attributes reported by a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeAttr {
    pub size: u64,
    pub modified: OffsetDateTime,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Joins a parent path and a child name into a flat object key.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_handles_root() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", "b"), "a/b");
        assert_eq!(join_path("a/b", "c.txt"), "a/b/c.txt");
    }
}
