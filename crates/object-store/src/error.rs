use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors. Backend failures carry the stringified cause; the node
/// layer above maps every variant to an I/O failure at the FUSE boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("short read for {key}: wanted {wanted} bytes, got {got}")]
    ShortRead { key: String, wanted: u64, got: u64 },

    #[error("invalid range for {key}: offset {offset} + len {len} exceeds size {size}")]
    InvalidRange {
        key: String,
        offset: u64,
        len: u64,
        size: u64,
    },
}

impl Error {
    /// Wraps any displayable backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
