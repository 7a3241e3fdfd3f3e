//! The command-line launcher: five positional arguments, hand-validated
//! per the original's `caching_checkErrors` rather than through `clap`'s
//! derive parser, because the usage-on-stdout / exit-1 contract (spec §6)
//! doesn't match `clap`'s default usage-on-stderr / exit-2 behavior.
//! Grounded on `rfs-cliApp/src/main.rs` for the mount/signal-handling shell
//! (`fuser::spawn_mount2`, `signal_hook::iterator::Signals`) and on
//! `original_source/CachingFileSystem.cpp`'s `main`/`caching_checkErrors`
//! for the validation rules themselves.

use blockfs_cache::BlockCache;
use blockfs_fuse::BlockFs;
use fuser::MountOption;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

const USAGE: &str = "Usage: blockfs rootDir mountDir numberOfBlocks fOld fNew\n";

fn fail_usage() -> ! {
    print!("{USAGE}");
    std::process::exit(1);
}

struct Args {
    root_dir: PathBuf,
    mount_dir: PathBuf,
    number_of_blocks: usize,
    f_old: f64,
    f_new: f64,
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() != 6 {
        fail_usage();
    }

    let root_dir = PathBuf::from(&argv[1]);
    let mount_dir = PathBuf::from(&argv[2]);
    if !root_dir.is_dir() || !mount_dir.is_dir() {
        fail_usage();
    }

    let number_of_blocks: i64 = argv[3].parse().unwrap_or(0);
    if number_of_blocks <= 0 {
        fail_usage();
    }
    let number_of_blocks = number_of_blocks as usize;

    let parse_fraction = |s: &str| -> f64 {
        match s.parse::<f64>() {
            Ok(v) if (0.0..=1.0).contains(&v) => v,
            _ => fail_usage(),
        }
    };
    let f_old = parse_fraction(&argv[4]);
    let f_new = parse_fraction(&argv[5]);

    if ((number_of_blocks as f64) * f_old).floor() <= 0.0 {
        fail_usage();
    }
    if ((number_of_blocks as f64) * f_new).floor() <= 0.0 {
        fail_usage();
    }
    if f_old + f_new > 1.0 {
        fail_usage();
    }

    Args { root_dir, mount_dir, number_of_blocks, f_old, f_new }
}

fn main() {
    let args = parse_args();

    let root_abs = std::fs::canonicalize(&args.root_dir).unwrap_or(args.root_dir.clone());
    let blocksize = std::fs::metadata(&root_abs)
        .map(|m| m.blksize() as usize)
        .unwrap_or(blockfs_core::DEFAULT_BLOCK_SIZE);

    let cache = BlockCache::new(
        blocksize,
        args.number_of_blocks,
        args.f_new,
        args.f_old,
        root_abs.to_string_lossy().into_owned(),
    );

    let fs = match BlockFs::new(root_abs, cache) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("blockfs: failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    let options = vec![MountOption::RO, MountOption::FSName("blockfs".to_string())];
    let session = match fuser::spawn_mount2(fs, &args.mount_dir, &options) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("blockfs: failed to mount: {e}");
            std::process::exit(1);
        }
    };

    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("unable to register signal handlers");
    if signals.forever().next().is_some() {
        println!("\nsignal received, unmounting");
    }
    drop(session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_rule_rejects_fraction_too_small_to_reserve_a_single_block() {
        let blocks = 4_f64;
        let f = 0.2_f64;
        assert_eq!((blocks * f).floor(), 0.0);
    }

    #[test]
    fn floor_rule_accepts_fraction_reserving_at_least_one_block() {
        let blocks = 4_f64;
        let f = 0.26_f64;
        assert_eq!((blocks * f).floor(), 1.0);
    }
}
