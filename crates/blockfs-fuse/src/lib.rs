//! The FUSE host adapter: dispatches filesystem callbacks against a
//! `BlockCache`-backed read-only passthrough of `root`.
//!
//! Grounded on `rfs-fuse/src/lib.rs` for the `fuser::Filesystem` impl shape
//! (per-call structure, `map_error`, attribute construction) and on
//! `original_source/CachingFileSystem.cpp` for the operation semantics:
//! special-path masking, write-mode rejection, the read loop (delegated to
//! `read_pipeline`), rename re-keying, and the `ioctl` dump.

mod block_source;
mod dump;
mod error;
mod oplog;
pub mod read_pipeline;

pub use block_source::DirectFile;
pub use dump::format_dump;
pub use error::{map_error, map_io_error};
pub use oplog::OperationLog;
pub use read_pipeline::BlockSource;

use blockfs_cache::BlockCache;
use blockfs_core::Error as FsError;
use fuser::{FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyIoctl, ReplyOpen, Request, consts};
use libc::{EACCES, EBADF, O_RDWR, O_WRONLY};
use std::collections::HashMap;
use std::ffi::{CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL_FILE: Duration = Duration::from_secs(7);
const TTL_DIR: Duration = Duration::from_secs(3);
const ROOT_INO: u64 = 1;
const HIDDEN_LOG_NAME: &str = ".filesystem.log";

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::new((-secs) as u64, 0)
    }
}

fn metadata_to_attr(ino: u64, meta: &std::fs::Metadata, blksize: u32) -> FileAttr {
    let kind = if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::RegularFile
    };
    FileAttr {
        ino,
        size: meta.size(),
        blocks: meta.blocks(),
        atime: system_time(meta.atime(), meta.atime_nsec()),
        mtime: system_time(meta.mtime(), meta.mtime_nsec()),
        ctime: system_time(meta.ctime(), meta.ctime_nsec()),
        crtime: system_time(meta.ctime(), meta.ctime_nsec()),
        kind,
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize,
        flags: 0,
    }
}

/// The `fuser::Filesystem` implementation: a read-only passthrough of
/// `root`, with file content served through `cache`.
pub struct BlockFs {
    cache: BlockCache,
    oplog: OperationLog,

    path_to_ino: HashMap<PathBuf, u64>,
    ino_to_path: HashMap<u64, PathBuf>,
    next_ino: u64,

    file_handles: HashMap<u64, DirectFile>,
    next_fh: u64,
}

impl BlockFs {
    pub fn new(root: PathBuf, cache: BlockCache) -> io::Result<Self> {
        let oplog = OperationLog::open(&root)?;
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert(root.clone(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, root.clone());
        Ok(Self {
            cache,
            oplog,
            path_to_ino,
            ino_to_path,
            next_ino: ROOT_INO + 1,
            file_handles: HashMap::new(),
            next_fh: 1,
        })
    }

    fn ino_for_path(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.path_to_ino.insert(path.to_path_buf(), ino);
        self.ino_to_path.insert(ino, path.to_path_buf());
        ino
    }

    fn path_for_ino(&self, ino: u64) -> Option<PathBuf> {
        self.ino_to_path.get(&ino).cloned()
    }

    /// Re-keys the ino table after a successful rename, so later calls on
    /// inodes obtained before the rename still resolve. Not part of the
    /// cache's own contract (spec §4.3 only covers the block cache); this
    /// keeps the host adapter's own bookkeeping consistent alongside it.
    fn rekey_inodes(&mut self, old_path: &Path, new_path: &Path, is_dir: bool) {
        if let Some(ino) = self.path_to_ino.remove(old_path) {
            self.path_to_ino.insert(new_path.to_path_buf(), ino);
            self.ino_to_path.insert(ino, new_path.to_path_buf());
        }
        if !is_dir {
            return;
        }
        let affected: Vec<(u64, PathBuf)> = self
            .ino_to_path
            .iter()
            .filter_map(|(&ino, p)| {
                p.strip_prefix(old_path)
                    .ok()
                    .map(|rel| (ino, new_path.join(rel)))
            })
            .collect();
        for (ino, new_p) in affected {
            if let Some(old_p) = self.ino_to_path.insert(ino, new_p.clone()) {
                self.path_to_ino.remove(&old_p);
            }
            self.path_to_ino.insert(new_p, ino);
        }
    }

    fn full_path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

impl Filesystem for BlockFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), libc::c_int> {
        Ok(())
    }

    fn destroy(&mut self) {
        self.cache.teardown();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.oplog.record("lookup");

        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {parent}"))));
            return;
        };
        if parent == ROOT_INO && name == HIDDEN_LOG_NAME {
            reply.error(map_error(&FsError::NotFound(HIDDEN_LOG_NAME.to_string())));
            return;
        }

        let full = parent_path.join(name);
        match std::fs::symlink_metadata(&full) {
            Ok(meta) => {
                let ino = self.ino_for_path(&full);
                let ttl = if meta.is_dir() { TTL_DIR } else { TTL_FILE };
                let attr = metadata_to_attr(ino, &meta, self.cache.blocksize() as u32);
                reply.entry(&ttl, &attr, 0);
            }
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        self.oplog.record("getattr");

        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let ttl = if meta.is_dir() { TTL_DIR } else { TTL_FILE };
                let attr = metadata_to_attr(ino, &meta, self.cache.blocksize() as u32);
                reply.attr(&ttl, &attr);
            }
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        self.oplog.record("access");

        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
            reply.error(libc::EILSEQ);
            return;
        };
        // SAFETY: cpath is a valid NUL-terminated path string.
        let res = unsafe { libc::access(cpath.as_ptr(), mask) };
        if res == 0 {
            reply.ok();
        } else {
            reply.error(io::Error::last_os_error().raw_os_error().unwrap_or(EACCES));
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        self.oplog.record("opendir");

        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                let fh = self.next_fh;
                self.next_fh += 1;
                reply.opened(fh, 0);
            }
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        self.oplog.record("readdir");

        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        let parent_ino = if ino == ROOT_INO {
            ROOT_INO
        } else {
            path.parent()
                .map(|p| self.ino_for_path(p))
                .unwrap_or(ROOT_INO)
        };

        let read_dir = match std::fs::read_dir(&path) {
            Ok(rd) => rd,
            Err(e) => {
                reply.error(map_io_error(&e));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, std::ffi::OsString)> = vec![
            (ino, FileType::Directory, ".".into()),
            (parent_ino, FileType::Directory, "..".into()),
        ];

        for dir_entry in read_dir {
            let Ok(dir_entry) = dir_entry else { continue };
            let name = dir_entry.file_name();
            if ino == ROOT_INO && name == HIDDEN_LOG_NAME {
                continue;
            }
            let Ok(file_type) = dir_entry.file_type() else { continue };
            let kind = if file_type.is_dir() {
                FileType::Directory
            } else if file_type.is_symlink() {
                FileType::Symlink
            } else {
                FileType::RegularFile
            };
            let child_ino = self.ino_for_path(&dir_entry.path());
            entries.push((child_ino, kind, name));
        }

        for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.oplog.record("releasedir");
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        self.oplog.record("open");

        if flags & (O_WRONLY | O_RDWR) != 0 {
            reply.error(map_error(&FsError::PermissionDenied("write-mode open on read-only mount".to_string())));
            return;
        }
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        match DirectFile::open(&path) {
            Ok(direct) => {
                let fh = self.next_fh;
                self.next_fh += 1;
                self.file_handles.insert(fh, direct);
                reply.opened(fh, consts::FOPEN_DIRECT_IO);
            }
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.oplog.record("read");

        if size == 0 {
            reply.data(&[]);
            return;
        }
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {ino}"))));
            return;
        };
        let Some(source) = self.file_handles.get_mut(&fh) else {
            reply.error(EBADF);
            return;
        };
        let full_path = Self::full_path_str(&path);
        let mut dest = vec![0u8; size as usize];
        match read_pipeline::read(&mut self.cache, source, &full_path, offset, size as usize, &mut dest) {
            Ok(n) => reply.data(&dest[..n]),
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        self.oplog.record("flush");
        reply.ok();
    }

    fn release(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
        self.oplog.record("release");
        self.file_handles.remove(&fh);
        reply.ok();
    }

    fn rename(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, new_parent: u64, new_name: &OsStr, _flags: u32, reply: ReplyEmpty) {
        self.oplog.record("rename");

        let (Some(parent_path), Some(new_parent_path)) = (self.path_for_ino(parent), self.path_for_ino(new_parent)) else {
            reply.error(map_error(&FsError::NotFound(format!("inode {parent} or {new_parent}"))));
            return;
        };
        let old_full = parent_path.join(name);
        let new_full = new_parent_path.join(new_name);

        let meta = match std::fs::symlink_metadata(&old_full) {
            Ok(m) => m,
            Err(e) => {
                reply.error(map_io_error(&e));
                return;
            }
        };
        let is_dir = meta.is_dir();

        match std::fs::rename(&old_full, &new_full) {
            Ok(()) => {
                if is_dir {
                    let mut old_s = Self::full_path_str(&old_full);
                    let mut new_s = Self::full_path_str(&new_full);
                    if !old_s.ends_with('/') {
                        old_s.push('/');
                    }
                    if !new_s.ends_with('/') {
                        new_s.push('/');
                    }
                    self.cache.rename_prefix(&old_s, &new_s);
                } else {
                    self.cache.rename_exact(&Self::full_path_str(&old_full), &Self::full_path_str(&new_full));
                }
                self.rekey_inodes(&old_full, &new_full, is_dir);
                reply.ok();
            }
            Err(e) => reply.error(map_io_error(&e)),
        }
    }

    fn ioctl(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: u32,
        _cmd: u32,
        _in_data: &[u8],
        _out_size: u32,
        reply: ReplyIoctl,
    ) {
        self.oplog.record("ioctl");
        let dump = format_dump(&self.cache);
        self.oplog.record_dump(&dump);
        reply.ok(0, &[]);
    }

    fn readlink(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyData) {
        reply.error(libc::ENOSYS);
    }

    fn link(&mut self, _req: &Request<'_>, _ino: u64, _new_parent: u64, _new_name: &OsStr, reply: ReplyEntry) {
        reply.error(libc::ENOSYS);
    }

    fn symlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, _link: &Path, reply: ReplyEntry) {
        reply.error(libc::ENOSYS);
    }
}
