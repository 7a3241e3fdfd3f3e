//! Shared value types and error taxonomy for the blockfs workspace.
//!
//! This crate has no I/O of its own; it exists so that `blockfs-cache` and
//! `blockfs-fuse` agree on one error type instead of each inventing their
//! own conversions at the boundary.

use thiserror::Error;

/// Fallback block size used when the underlying filesystem's preferred I/O
/// size cannot be queried. Real runs sample `st_blksize` of the root
/// directory instead.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Error taxonomy from spec §7. `CacheCapacityReached` has no variant here:
/// it is not an error, it is a side effect of `BlockCache::insert` and never
/// escapes the cache. `AllocationFailure` is likewise absent: it is treated
/// as fatal and left to the default global allocator abort path.
#[derive(Debug, Error)]
pub enum Error {
    /// Argument validation failed before mount.
    #[error("{0}")]
    ConfigInvalid(String),

    /// Special-path masking, or the underlying filesystem reports the
    /// entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write-mode open was attempted against this read-only mount.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The underlying filesystem returned an error on metadata, open,
    /// read, rename, or directory traversal. Propagated unchanged.
    #[error("underlying I/O error: {0}")]
    UnderlyingIo(#[from] std::io::Error),
}

impl Error {
    /// Maps this error to the libc errno the FUSE host should reply with.
    /// Kept here (rather than only in `blockfs-fuse`) because the mapping
    /// is part of this type's contract, not an FS-layer implementation
    /// detail; `blockfs-fuse::map_io_error` covers the raw `std::io::Error`
    /// case that never gets wrapped into this enum.
    pub fn errno(&self) -> i32 {
        match self {
            Error::ConfigInvalid(_) => libc::EINVAL,
            Error::NotFound(_) => libc::ENOENT,
            Error::PermissionDenied(_) => libc::EACCES,
            Error::UnderlyingIo(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
