//! Singleton guard: an exclusive advisory lock on a well-known PID file.
//!
//! The lock file's presence plus the lock held on it is the only source of
//! truth for "the daemon is running". The holder writes its PID as the file's
//! sole content so that `stop` can find it.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::{lock_io, LockError};

/// rw-r--r--
const LOCK_FILE_MODE: u32 = 0o644;

/// `status` and `stop` take the lock for an instant to tell a live owner
/// from a stale file. A start that collides with such a check waits this
/// long and tries once more before deciding another daemon owns the lock.
const CONTENTION_BACKOFF: Duration = Duration::from_millis(100);

/// A concurrent `release` can unlink the file between our open and our lock;
/// in that case we retry against the fresh path.
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Result of [`DaemonLock::acquire`]. Contention is not an error.
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(DaemonLock),
    AlreadyRunning,
}

/// The held lock. Dropping it without [`release`](Self::release) still frees
/// the kernel lock but leaves the file behind.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    file: Option<File>,
    owner_pid: u32,
}

impl DaemonLock {
    /// Open (creating if absent) and try to exclusively lock `path`.
    pub fn acquire(path: &Path) -> Result<LockOutcome, LockError> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(LOCK_FILE_MODE)
                .open(path)
                .map_err(|e| lock_io(path, e))?;

            if !lock_with_backoff(&file, path)? {
                tracing::debug!(lock = %path.display(), "lock held by another process");
                return Ok(LockOutcome::AlreadyRunning);
            }

            if !still_linked(path, &file)? {
                tracing::debug!(lock = %path.display(), "lock file replaced while locking; retrying");
                continue;
            }

            let owner_pid = std::process::id();
            record_pid(&file, owner_pid).map_err(|e| lock_io(path, e))?;
            tracing::info!(lock = %path.display(), pid = owner_pid, "acquired daemon lock");
            return Ok(LockOutcome::Acquired(Self {
                path: path.to_path_buf(),
                file: Some(file),
                owner_pid,
            }));
        }

        Err(lock_io(
            path,
            std::io::Error::other("lock file kept changing while acquiring it"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }

    /// Delete the lock file, then unlock and close it. Idempotent.
    pub fn release(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(lock_io(&self.path, err)),
        }
        FileExt::unlock(&file).map_err(|e| lock_io(&self.path, e))?;
        drop(file);

        tracing::info!(lock = %self.path.display(), "released daemon lock");
        Ok(())
    }
}

/// Parse the PID recorded in `path`.
///
/// Returns [`LockError::NotRunning`] when the file is absent or does not hold
/// a positive decimal process id.
pub fn read_owner_pid(path: &Path) -> Result<u32, LockError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(LockError::NotRunning {
                path: path.to_path_buf(),
                reason: "lock file absent",
            })
        }
        Err(err) => return Err(lock_io(path, err)),
    };

    parse_pid(&text).ok_or_else(|| LockError::NotRunning {
        path: path.to_path_buf(),
        reason: "lock file holds no process id",
    })
}

/// Whether some process currently holds the lock on `path`.
pub fn is_locked(path: &Path) -> Result<bool, LockError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(lock_io(path, err)),
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            FileExt::unlock(&file).map_err(|e| lock_io(path, e))?;
            Ok(false)
        }
        Err(err) if is_contended(&err) => Ok(true),
        Err(err) => Err(lock_io(path, err)),
    }
}

/// PID of the live lock holder, or [`LockError::NotRunning`] when the file
/// is absent, unparsable, or left behind by a process that no longer holds it.
pub fn current_owner(path: &Path) -> Result<u32, LockError> {
    let pid = read_owner_pid(path)?;
    if !is_locked(path)? {
        return Err(LockError::NotRunning {
            path: path.to_path_buf(),
            reason: "stale lock file",
        });
    }
    Ok(pid)
}

fn parse_pid(text: &str) -> Option<u32> {
    let digits = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

fn record_pid(file: &File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    let mut writer = file;
    writer.write_all(pid.to_string().as_bytes())?;
    file.sync_all()
}

fn still_linked(path: &Path, file: &File) -> Result<bool, LockError> {
    let held = file.metadata().map_err(|e| lock_io(path, e))?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(lock_io(path, err)),
    }
}

/// `Ok(false)` when the lock is still contended after one back-off.
fn lock_with_backoff(file: &File, path: &Path) -> Result<bool, LockError> {
    for attempt in 0..2 {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(true),
            Err(err) if is_contended(&err) => {
                if attempt == 0 {
                    std::thread::sleep(CONTENTION_BACKOFF);
                }
            }
            Err(err) => return Err(lock_io(path, err)),
        }
    }
    Ok(false)
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
