//! The append-only operation log at `rootDir/.filesystem.log`, per spec §6
//! ("Persisted state") and §5 ("the log stream ... is append-only and
//! flushed after each record"). Grounded directly on the original's
//! `cache.logFile << time(NULL) << " <op>\n"; cache.logFile.flush();`
//! idiom, repurposed from `rfs-fuse`'s own per-call `speed_file` writer
//! (`writeln!(file, "[speed] ...")` calls).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct OperationLog {
    file: File,
}

impl OperationLog {
    /// Opens (creating if absent) `root/.filesystem.log` in append mode.
    pub fn open(root: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join(".filesystem.log"))?;
        Ok(Self { file })
    }

    /// Appends one `«unix seconds» «operation»\n` line and flushes.
    /// Failures here are swallowed: a stuck log must never fail a
    /// filesystem callback (spec §7, "during teardown, failures are
    /// swallowed" generalizes naturally to best-effort logging).
    pub fn record(&mut self, operation: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let _ = writeln!(self.file, "{now} {operation}");
        let _ = self.file.flush();
    }

    /// Appends an already-rendered diagnostic dump (see `dump::format_dump`)
    /// verbatim, matching `caching_ioctl`'s direct writes to `cache.logFile`.
    pub fn record_dump(&mut self, dump: &str) {
        let _ = self.file.write_all(dump.as_bytes());
        let _ = self.file.flush();
    }
}
