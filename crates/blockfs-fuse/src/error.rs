//! Translates this crate's errors into the `libc::c_int` codes FUSE
//! replies expect, grounded on `rfs-fuse::map_error`'s shape (a `match`
//! from a backend error enum to an errno constant).

use blockfs_core::Error;

pub fn map_error(error: &Error) -> libc::c_int {
    error.errno()
}

pub fn map_io_error(error: &std::io::Error) -> libc::c_int {
    error.raw_os_error().unwrap_or(libc::EIO)
}
