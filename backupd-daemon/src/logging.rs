//! Tracing setup and the daemon's self-rotating log file.
//!
//! Every record re-opens the log in append mode, so the writer itself can
//! rotate the file between records without any reopen handshake. Rotated
//! copies shift up one slot at a time:
//!   backupd.log → backupd.log.1 → … → backupd.log.5 (then dropped)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::MakeWriter;

use crate::paths::ROTATION_INTERVAL;

/// Live file size that triggers rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept next to the live file.
pub const MAX_ROTATED_FILES: usize = 5;

/// rw-r-----
const LOG_FILE_MODE: u32 = 0o640;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(log_file: Option<&Path>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(RotatingLog::new(path))
                .try_init();
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(io::stderr)
                .try_init();
        }
    }
}

/// `MakeWriter` that appends each record to `path`, rotating it first when
/// it has grown past `max_bytes`. The size is looked at no more than once
/// per `check_every`.
#[derive(Debug)]
pub struct RotatingLog {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    check_every: Duration,
    last_check: Mutex<Option<Instant>>,
}

impl RotatingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, MAX_LOG_BYTES, MAX_ROTATED_FILES, ROTATION_INTERVAL)
    }

    pub fn with_limits(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        keep: usize,
        check_every: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            keep: keep.max(1),
            check_every,
            last_check: Mutex::new(None),
        }
    }

    /// Rotate when the live file has reached `max_bytes`.
    ///
    /// Renaming onto an occupied slot replaces it, which is how the oldest
    /// copy falls off the end. The live file is recreated by the next record.
    pub fn rotate_if_oversized(&self) -> io::Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.max_bytes => {}
            Ok(_) => return Ok(false),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        }

        for n in (1..self.keep).rev() {
            match fs::rename(self.slot(n), self.slot(n + 1)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        fs::rename(&self.path, self.slot(1))?;
        Ok(true)
    }

    fn slot(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn check_due(&self) -> bool {
        let Ok(mut last) = self.last_check.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.check_every => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn open(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .mode(LOG_FILE_MODE)
            .open(&self.path)
    }
}

impl<'a> MakeWriter<'a> for RotatingLog {
    type Writer = Box<dyn Write>;

    fn make_writer(&'a self) -> Self::Writer {
        // Emitting a tracing event from here would re-enter the subscriber,
        // so a rotation failure is written into the log directly.
        let failed = if self.check_due() {
            self.rotate_if_oversized().err()
        } else {
            None
        };
        match self.open() {
            Ok(mut file) => {
                if let Some(err) = failed {
                    let _ = writeln!(file, "log rotation failed for {}: {err}", self.path.display());
                }
                Box::new(file)
            }
            Err(_) => Box::new(io::sink()),
        }
    }
}
