//! Inode ↔ node mapping for the FUSE filesystem.
//!
//! FUSE identifies entries by 64-bit inode numbers; the node layer works in
//! paths. This table owns the mapping for the lifetime of the mount, so a
//! path keeps the same inode for as long as its node lives.

use std::collections::HashMap;

use crate::fs::Node;

/// Registry of live nodes keyed by inode, with a path index for reuse.
pub struct InodeTable {
    /// Path to inode mapping
    path_to_inode: HashMap<String, u64>,
    /// Inode to node mapping
    nodes: HashMap<u64, Node>,
    /// Next available inode number (starts at 2, as 1 is reserved for root)
    next_inode: u64,
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE).
    pub const ROOT_INODE: u64 = 1;

    /// Create a table with the mount root pre-registered.
    pub fn new(root: Node) -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            nodes: HashMap::new(),
            next_inode: 2,
        };
        table.path_to_inode.insert(root.path(), Self::ROOT_INODE);
        table.nodes.insert(Self::ROOT_INODE, root);
        table
    }

    /// Get the inode for a node's path, assigning a fresh one on first
    /// encounter.
    pub fn get_or_insert(&mut self, node: Node) -> u64 {
        let path = node.path();
        if let Some(&inode) = self.path_to_inode.get(&path) {
            return inode;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path, inode);
        self.nodes.insert(inode, node);
        inode
    }

    pub fn get(&self, inode: u64) -> Option<&Node> {
        self.nodes.get(&inode)
    }

    pub fn inode_for_path(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    /// Drop the mapping for an unlinked path, returning its inode.
    pub fn remove_path(&mut self, path: &str) -> Option<u64> {
        let inode = self.path_to_inode.remove(path)?;
        self.nodes.remove(&inode);
        Some(inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::fs::DirectoryNode;
    use object_store::{Bucket, MemoryBucket};
    use std::sync::Arc;

    async fn root_node() -> Node {
        let bucket: Arc<dyn Bucket> = Arc::new(MemoryBucket::new());
        let db = Database::in_memory().await.unwrap();
        Node::Directory(DirectoryNode::root(bucket, db).await.unwrap())
    }

    #[tokio::test]
    async fn root_is_inode_one() {
        let table = InodeTable::new(root_node().await);
        assert!(table.get(InodeTable::ROOT_INODE).is_some());
        assert_eq!(table.inode_for_path(""), Some(InodeTable::ROOT_INODE));
    }

    #[tokio::test]
    async fn get_or_insert_is_stable_per_path() {
        let root = root_node().await;
        let Node::Directory(dir) = &root else {
            unreachable!()
        };
        let file = dir.create_file("foo.txt").await.unwrap();

        let mut table = InodeTable::new(root.clone());
        let first = table.get_or_insert(Node::File(file.clone()));
        let second = table.get_or_insert(Node::File(file));
        assert_eq!(first, second);
        assert_ne!(first, InodeTable::ROOT_INODE);
    }

    #[tokio::test]
    async fn remove_path_drops_node() {
        let root = root_node().await;
        let Node::Directory(dir) = &root else {
            unreachable!()
        };
        let file = dir.create_file("foo.txt").await.unwrap();

        let mut table = InodeTable::new(root.clone());
        let inode = table.get_or_insert(Node::File(file));

        assert_eq!(table.remove_path("foo.txt"), Some(inode));
        assert!(table.get(inode).is_none());
        assert!(table.inode_for_path("foo.txt").is_none());
    }
}
