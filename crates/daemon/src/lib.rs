// Service modules (mount functionality)
pub mod database;
pub mod fs;
pub mod fuse;

// Re-exports for consumers
pub use database::Database;
pub use fs::{build_tree, DirectoryNode, FileNode, FsError, Node};
pub use fuse::BucketFs;
