//! fuser `Filesystem` implementation bridging kernel callbacks onto the
//! async node layer.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::fs::{join_path, DirectoryNode, FileNode, FsError, Node, NodeAttr, NodeKind};
use crate::fuse::InodeTable;

/// How long the kernel may reuse directory attributes before re-querying.
const DIR_ATTR_TTL: Duration = Duration::from_secs(5);
/// Files change size on flush, so their attributes go stale faster.
const FILE_ATTR_TTL: Duration = Duration::from_secs(1);

const BLOCK_SIZE: u32 = 4096;

/// The mounted filesystem. Owns the inode table and a handle to the runtime
/// that drives node operations; the fuser session thread blocks on each
/// request, and dropping the runtime at unmount cancels in-flight work.
pub struct BucketFs {
    rt: Handle,
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

impl BucketFs {
    pub fn new(rt: Handle, root: Node) -> Self {
        Self {
            rt,
            inodes: InodeTable::new(root),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn ttl(kind: NodeKind) -> Duration {
        match kind {
            NodeKind::Directory => DIR_ATTR_TTL,
            NodeKind::File => FILE_ATTR_TTL,
        }
    }

    /// Synthetic attributes: fully open mode, link count 1, every timestamp
    /// pinned to the node's modification time.
    fn file_attr(&self, inode: u64, attr: NodeAttr) -> FileAttr {
        let ts: SystemTime = attr.modified.into();
        FileAttr {
            ino: inode,
            size: attr.size,
            blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: ts,
            mtime: ts,
            ctime: ts,
            crtime: ts,
            kind: match attr.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::File => FileType::RegularFile,
            },
            perm: 0o777,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn directory(&self, inode: u64) -> Result<Arc<DirectoryNode>, FsError> {
        match self.inodes.get(inode) {
            Some(Node::Directory(dir)) => Ok(dir.clone()),
            Some(Node::File(_)) => Err(FsError::NotDirectory),
            None => Err(FsError::NotFound),
        }
    }

    fn file(&self, inode: u64) -> Result<Arc<FileNode>, FsError> {
        match self.inodes.get(inode) {
            Some(Node::File(file)) => Ok(file.clone()),
            Some(Node::Directory(_)) => Err(FsError::IsDirectory),
            None => Err(FsError::NotFound),
        }
    }
}

impl Filesystem for BucketFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let dir = match self.directory(parent) {
            Ok(dir) => dir,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(dir.lookup(name)) {
            Some(node) => {
                let attr = self.rt.block_on(node.getattr());
                let inode = self.inodes.get_or_insert(node);
                reply.entry(&Self::ttl(attr.kind), &self.file_attr(inode, attr), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(node) = self.inodes.get(ino).cloned() else {
            reply.error(libc::ENOENT);
            return;
        };

        let attr = self.rt.block_on(node.getattr());
        reply.attr(&Self::ttl(attr.kind), &self.file_attr(ino, attr));
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(file.open()) {
            // Keep cached pages across closes: the object cannot change
            // underneath us within one mount.
            Ok(()) => reply.opened(0, fuser::consts::FOPEN_KEEP_CACHE),
            Err(err) => {
                error!(key = %file.key(), error = %err, "open failed");
                reply.error(err.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(file.read(offset.max(0) as u64, size)) {
            Ok(data) => reply.data(&data),
            Err(err) => {
                error!(key = %file.key(), offset, size, error = %err, "read failed");
                reply.error(err.errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(file.write(offset.max(0) as u64, data)) {
            Ok(written) => reply.written(written),
            Err(err) => {
                error!(key = %file.key(), error = %err, "write failed");
                reply.error(err.errno());
            }
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(file.flush()) {
            Ok(()) => reply.ok(),
            Err(err) => {
                error!(key = %file.key(), error = %err, "flush failed");
                reply.error(err.errno());
            }
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        // Same commit point as flush: push the buffer to the store.
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(file.flush()) {
            Ok(()) => reply.ok(),
            Err(err) => {
                error!(key = %file.key(), error = %err, "fsync failed");
                reply.error(err.errno());
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let dir = match self.directory(parent) {
            Ok(dir) => dir,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(dir.create_file(name)) {
            Ok(file) => {
                let attr = self.rt.block_on(file.getattr());
                let inode = self.inodes.get_or_insert(Node::File(file));
                reply.created(
                    &FILE_ATTR_TTL,
                    &self.file_attr(inode, attr),
                    0,
                    0,
                    fuser::consts::FOPEN_KEEP_CACHE,
                );
            }
            Err(err) => {
                error!(parent = %dir.path(), name, error = %err, "create failed");
                reply.error(err.errno());
            }
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let dir = match self.directory(parent) {
            Ok(dir) => dir,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(dir.mkdir(name)) {
            Ok(child) => {
                let attr = self.rt.block_on(child.getattr());
                let inode = self.inodes.get_or_insert(Node::Directory(child));
                reply.entry(&DIR_ATTR_TTL, &self.file_attr(inode, attr), 0);
            }
            Err(err) => {
                error!(parent = %dir.path(), name, error = %err, "mkdir failed");
                reply.error(err.errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let dir = match self.directory(parent) {
            Ok(dir) => dir,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        match self.rt.block_on(dir.unlink(name)) {
            Ok(()) => {
                self.inodes.remove_path(&join_path(dir.path(), name));
                reply.ok();
            }
            Err(err) => {
                error!(parent = %dir.path(), name, error = %err, "unlink failed");
                reply.error(err.errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        // Directory removal is not supported: the store has no folders to
        // delete and recursive object deletion is out of scope.
        debug!(parent, name = ?name, "rmdir rejected");
        reply.error(FsError::Unsupported.errno());
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let dir = match self.directory(ino) {
            Ok(dir) => dir,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        let parent_inode = dir
            .parent()
            .and_then(|parent| self.inodes.inode_for_path(parent.path()))
            .unwrap_or(InodeTable::ROOT_INODE);

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_inode, FileType::Directory, "..".to_string()),
        ];
        for (name, node) in self.rt.block_on(dir.entries()) {
            let kind = if node.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let child_inode = self.inodes.get_or_insert(node);
            entries.push((child_inode, kind, name));
        }

        for (i, (inode, kind, name)) in entries.into_iter().enumerate().skip(offset.max(0) as usize)
        {
            // The next offset is i + 1; a full buffer ends the batch.
            if reply.add(inode, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }
}
