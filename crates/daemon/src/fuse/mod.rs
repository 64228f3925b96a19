//! Kernel-facing FUSE adapter.
//!
//! - `BucketFs`: fuser `Filesystem` implementation routing callbacks onto
//!   the async node layer
//! - `InodeTable`: inode ↔ node mapping with stable inodes per path
//!
//! Every callback replies with a POSIX errno on failure; no panic crosses
//! this boundary. Backend and metadata failures surface as `EIO`.

mod filesystem;
mod inode_table;

pub use filesystem::BucketFs;
pub use inode_table::InodeTable;
