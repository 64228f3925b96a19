use thiserror::Error;

/// Node-layer errors, translated to errno equivalents at the FUSE boundary.
/// Backend and metadata failures both surface as plain I/O errors to the
/// process that issued the triggering call.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("metadata store error: {0}")]
    Metadata(#[from] sqlx::Error),

    #[error("no such entry")]
    NotFound,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("operation not supported")]
    Unsupported,
}

impl FsError {
    /// POSIX errno equivalent for replies crossing the kernel boundary.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Store(_) | FsError::Metadata(_) => libc::EIO,
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::IsDirectory => libc::EISDIR,
            FsError::Unsupported => libc::ENOSYS,
        }
    }
}
