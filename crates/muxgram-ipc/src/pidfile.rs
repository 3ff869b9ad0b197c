//! Single-instance PID-file lock.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{IpcError, IpcResult};

/// Exclusive lock on the daemon's PID file.
///
/// Held for the daemon's lifetime; dropping it releases the lock and
/// removes the file. Acquisition fails with [`IpcError::AlreadyRunning`]
/// when another live process holds the lock (or wrote a live PID without
/// locking); a stale file from a dead process is overwritten.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Acquire the lock at `path`, writing our PID into it.
    ///
    /// # Errors
    ///
    /// [`IpcError::AlreadyRunning`] if another instance owns the file,
    /// [`IpcError::Io`] on filesystem failure.
    pub fn acquire(path: &Path) -> IpcResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let pid = read_pid(&mut file);
            return Err(IpcError::AlreadyRunning { pid });
        }

        // The lock is ours, but an older daemon may have written the file
        // without locking it. A live foreign PID still means already-running.
        let own_pid = i32::try_from(std::process::id()).unwrap_or_default();
        if let Some(pid) = read_pid(&mut file) {
            if pid != own_pid && process_alive(pid) {
                fs2::FileExt::unlock(&file)?;
                return Err(IpcError::AlreadyRunning { pid: Some(pid) });
            }
            if pid != own_pid {
                debug!(stale_pid = pid, "overwriting stale pid file");
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{own_pid}")?;
        file.flush()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The locked file's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(error = %e, "failed to release pid lock");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, path = %self.path.display(), "failed to remove pid file");
        }
    }
}

fn read_pid(file: &mut File) -> Option<i32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 probes existence without delivering anything.
    kill(Pid::from_raw(pid), None).is_ok()
}
