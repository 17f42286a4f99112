//! Data directory lock
//!
//! The reading store assumes a single writer. A PID lock file in the data
//! directory stops a second GridSense process from opening the same sled
//! database.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lock acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another GridSense instance is already running (PID: {pid}); stop it or remove {path:?}")]
    Held { pid: u32, path: PathBuf },
    #[error("lock file I/O error ({0:?}): {1}")]
    Io(PathBuf, std::io::Error),
}

/// PID lock held for the lifetime of the process.
#[derive(Debug)]
pub struct DataDirLock {
    lock_path: PathBuf,
    owned: bool,
}

impl DataDirLock {
    const LOCK_FILE_NAME: &'static str = ".gridsense.lock";

    /// Acquire the lock for `data_dir`, creating the directory if needed.
    ///
    /// A lock file whose PID is no longer alive is treated as stale and
    /// replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self, LockError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| LockError::Io(data_dir.to_path_buf(), e))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);
        if let Some(pid) = Self::live_holder(&lock_path) {
            return Err(LockError::Held {
                pid,
                path: lock_path,
            });
        }
        if lock_path.exists() {
            tracing::info!(path = %lock_path.display(), "Removing stale lock file");
            fs::remove_file(&lock_path).map_err(|e| LockError::Io(lock_path.clone(), e))?;
        }

        let pid = std::process::id();
        let mut file =
            File::create(&lock_path).map_err(|e| LockError::Io(lock_path.clone(), e))?;
        writeln!(file, "{pid}").map_err(|e| LockError::Io(lock_path.clone(), e))?;

        tracing::debug!(pid, path = %lock_path.display(), "Acquired data directory lock");
        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID recorded in an existing lock file, if that process is still alive.
    fn live_holder(lock_path: &Path) -> Option<u32> {
        let contents = fs::read_to_string(lock_path).ok()?;
        let pid: u32 = contents.trim().parse().ok()?;
        (pid != std::process::id() && Self::is_process_running(pid)).then_some(pid)
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("gridsense"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    /// Release the lock (also done on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!("Failed to remove lock file: {}", e);
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        self.release();
    }
}
