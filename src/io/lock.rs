use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

/// Name of the lock file inside the board directory. It is never removed,
/// so every process contends on the same inode.
pub const LOCK_FILE: &str = "board.lock";

const POLL: Duration = Duration::from_millis(10);

/// How long a write waits for another `tsp` process to finish
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Exclusive flock on a board directory, held for one read-modify-write of
/// the board document and released when dropped.
#[derive(Debug)]
pub struct BoardLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("cannot open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("board at {path} is busy: another tsp process is writing")]
    Busy { path: PathBuf },
}

impl BoardLock {
    pub fn acquire(board_dir: &Path, wait: Duration) -> Result<Self, LockError> {
        let path = board_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + wait;
        let mut contended = false;
        while !try_flock(&file) {
            if Instant::now() >= deadline {
                return Err(LockError::Busy { path });
            }
            if !contended {
                debug!(path = %path.display(), "waiting for board lock");
                contended = true;
            }
            std::thread::sleep(POLL);
        }
        Ok(BoardLock { _file: file })
    }
}

#[cfg(unix)]
fn try_flock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and open for the call
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_reacquired_after_drop() {
        let tmp = TempDir::new().unwrap();
        let lock = BoardLock::acquire(tmp.path(), DEFAULT_WAIT).unwrap();
        drop(lock);
        assert!(BoardLock::acquire(tmp.path(), Duration::ZERO).is_ok());
        assert!(tmp.path().join(LOCK_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn held_lock_makes_writers_wait_then_give_up() {
        let tmp = TempDir::new().unwrap();
        let _held = BoardLock::acquire(tmp.path(), DEFAULT_WAIT).unwrap();
        let err = BoardLock::acquire(tmp.path(), Duration::from_millis(30));
        assert!(matches!(err, Err(LockError::Busy { .. })));
    }
}
