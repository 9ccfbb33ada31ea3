use std::path::PathBuf;
use std::time::Duration;

/// Well-known lock file shared by every invocation of the binary.
pub const DEFAULT_LOCK_FILE: &str = "/var/run/backupd.pid";

/// Environment override for [`DEFAULT_LOCK_FILE`].
pub const LOCK_FILE_ENV: &str = "BACKUPD_LOCK_FILE";

/// Upper bound on one wait for notifications, so the loop sees shutdown
/// requests even when the watched directory is idle.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(1);

/// How often the log writer looks at the live file size.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(5);

pub fn lock_file_path() -> PathBuf {
    match std::env::var_os(LOCK_FILE_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_LOCK_FILE),
    }
}
