//! Direct, block-aligned I/O against the underlying file, grounded on the
//! original `open(fullPath, O_RDONLY|O_DIRECT|O_SYNC)` / `pread` pair in
//! `original_source/CachingFileSystem.cpp` and on `rfs-fuse`'s own choice to
//! bypass the kernel cache (`FOPEN_DIRECT_IO` on every open).

use crate::read_pipeline::BlockSource;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
#[cfg(target_os = "linux")]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// An open underlying file, read with block-aligned positional I/O.
pub struct DirectFile {
    file: File,
}

impl DirectFile {
    /// Opens `path` read-only. On Linux, `O_DIRECT | O_SYNC` is requested so
    /// reads bypass the host kernel's page cache the way the original
    /// program did — this cache is the only cache in the read path.
    /// Other Unixes (no `O_DIRECT`) fall back to a plain synchronous open;
    /// blockfs's own cache still sits in front of every read either way.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        #[cfg(target_os = "linux")]
        options.custom_flags(libc::O_DIRECT | libc::O_SYNC);
        let file = options.open(path)?;
        Ok(Self { file })
    }
}

impl BlockSource for DirectFile {
    fn fetch_block(&mut self, aligned_offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(buf, aligned_offset)
    }
}
