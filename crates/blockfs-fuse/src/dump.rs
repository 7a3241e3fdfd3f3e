//! Renders the cache's current contents in eviction-candidate order, per
//! spec §4.4. Grounded on `original_source/CachingFileSystem.cpp`'s
//! `caching_ioctl`, which walks `cache.cacheVec` in reverse
//! (`rbegin()..rend()`) and writes `path offset/blksize+1 refCount` lines.

use blockfs_cache::BlockCache;
use std::fmt::Write as _;

/// One line per resident block, tail (most-evictable) to head, as
/// `«relative-path» «1-based-block-index» «refCount»`.
pub fn format_dump(cache: &BlockCache) -> String {
    let mut out = String::new();
    for entry in cache.snapshot() {
        let _ = writeln!(out, "{} {} {}", entry.relative_path, entry.block_index, entry.ref_count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfs_cache::AlignedBuffer;

    #[test]
    fn dump_lists_tail_to_head_with_relative_paths() {
        let mut c = BlockCache::new(4096, 4, 0.25, 0.25, "/root");
        c.insert("/root/a", 0, AlignedBuffer::new(4096, 4096), 4096);
        c.insert("/root/b", 4096, AlignedBuffer::new(4096, 4096), 4096);
        let dump = format_dump(&c);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines, vec!["a 1 1", "b 2 1"]);
    }
}
