//! Start, stop, and status entry points.
//!
//! `start` walks `Starting → Detaching → Locking → Watching → ShuttingDown →
//! Terminated`. A fatal error after the lock is taken leaves the lock file in
//! place; the kernel drops the lock itself when the process exits, so `stop`
//! and `status` then see a stale file rather than a live owner.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;

use backupd_core::DaemonConfig;

use crate::detach::{self, Detached};
use crate::error::{DaemonError, LockError};
use crate::lock::{self, DaemonLock, LockOutcome};
use crate::runtime;
use crate::shutdown::{exit_status, ShutdownFlag};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Detaching,
    Locking,
    Watching,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Starting => "starting",
            Phase::Detaching => "detaching",
            Phase::Locking => "locking",
            Phase::Watching => "watching",
            Phase::ShuttingDown => "shutting-down",
            Phase::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

fn enter(phase: Phase) {
    tracing::debug!(%phase, pid = std::process::id(), "lifecycle");
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub config: DaemonConfig,
    pub lock_path: PathBuf,
    /// Fork into the background. `false` keeps the process in the foreground.
    pub detach: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This is the launching process; the daemon continues as `child`.
    Detached { child: i32 },
    /// Another instance holds the lock. Nothing was touched.
    AlreadyRunning { owner: Option<u32> },
    /// The daemon ran and shut down after `signal`.
    Stopped { signal: Signal },
}

impl StartOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartOutcome::Detached { .. } | StartOutcome::AlreadyRunning { .. } => 0,
            StartOutcome::Stopped { signal } => exit_status(*signal),
        }
    }
}

/// Run the daemon until a shutdown signal arrives.
///
/// With `detach` set, this returns [`StartOutcome::Detached`] in the
/// launching process and keeps running in the forked child.
pub fn start(options: &StartOptions) -> Result<StartOutcome, DaemonError> {
    enter(Phase::Starting);

    if options.detach {
        enter(Phase::Detaching);
        if let Detached::Parent { child } = detach::daemonize()? {
            return Ok(StartOutcome::Detached {
                child: child.as_raw(),
            });
        }
    }

    enter(Phase::Locking);
    let mut lock = match DaemonLock::acquire(&options.lock_path)? {
        LockOutcome::Acquired(lock) => lock,
        LockOutcome::AlreadyRunning => {
            let owner = lock::read_owner_pid(&options.lock_path).ok();
            tracing::debug!(?owner, "lock held elsewhere");
            return Ok(StartOutcome::AlreadyRunning { owner });
        }
    };

    enter(Phase::Watching);
    if options.detach {
        detach::redirect_standard_streams()?;
    }
    tracing::info!(
        pid = lock.owner_pid(),
        lock_file = %lock.path().display(),
        "daemon started",
    );

    let event_loop = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    let shutdown = ShutdownFlag::new();
    let signal = event_loop
        .block_on(async {
            shutdown.install()?;
            runtime::watch(&options.config, &shutdown).await
        })
        .inspect_err(|err| tracing::error!(error = %err, "daemon stopped on fatal error"))?;

    enter(Phase::ShuttingDown);
    lock.release()?;
    tracing::info!(signal = signal.as_str(), "daemon stopped");
    enter(Phase::Terminated);
    Ok(StartOutcome::Stopped { signal })
}

// ---------------------------------------------------------------------------
// stop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Signalled { pid: u32 },
    /// Handled failure: there was nobody to signal.
    NotRunning { reason: &'static str },
}

/// Send SIGTERM to the process recorded in the lock file.
pub fn stop(lock_path: &Path) -> Result<StopOutcome, DaemonError> {
    let pid = match lock::current_owner(lock_path) {
        Ok(pid) => pid,
        Err(LockError::NotRunning { reason, .. }) => return Ok(StopOutcome::NotRunning { reason }),
        Err(err) => return Err(err.into()),
    };
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(StopOutcome::NotRunning {
            reason: "lock file holds no process id",
        });
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(StopOutcome::Signalled { pid }),
        Err(Errno::ESRCH) => Ok(StopOutcome::NotRunning {
            reason: "process gone",
        }),
        Err(source) => Err(DaemonError::Signal { pid, source }),
    }
}

/// Poll until nobody holds the lock on `lock_path`, or `timeout` passes.
///
/// Returns `true` when the owner let go in time.
pub fn wait_for_exit(lock_path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !matches!(lock::is_locked(lock_path), Ok(true)) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub lock_file: PathBuf,
}

pub fn status(lock_path: &Path) -> Result<DaemonStatus, DaemonError> {
    let pid = match lock::current_owner(lock_path) {
        Ok(pid) => Some(pid),
        Err(LockError::NotRunning { .. }) => None,
        Err(err) => return Err(err.into()),
    };
    Ok(DaemonStatus {
        running: pid.is_some(),
        pid,
        lock_file: lock_path.to_path_buf(),
    })
}
