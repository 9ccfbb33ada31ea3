use std::path::PathBuf;

use thiserror::Error;

use backupd_core::TreeError;
use backupd_sync::TransferError;

/// Failures of the singleton lock file.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No live owner could be found through the lock file.
    #[error("daemon is not running ({reason}): {path}")]
    NotRunning { path: PathBuf, reason: &'static str },
}

/// Failures of the kernel notification channel.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot open notification channel: {0}")]
    Init(#[source] std::io::Error),

    #[error("cannot watch {path}: {source}")]
    AddWatch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("waiting on notification channel failed: {0}")]
    Wait(#[source] std::io::Error),

    #[error("reading notification channel failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("notification channel closed unexpectedly")]
    ChannelClosed,

    #[error("watch on {path} was removed by the kernel")]
    WatchRemoved { path: PathBuf },
}

/// Why a single event could not be mirrored.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Error surface for the daemon lifecycle, event source, and dispatcher.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("failed to mirror {name}: {source}")]
    Dispatch {
        name: String,
        #[source]
        source: DispatchError,
    },

    #[error("failed to detach ({step}): {source}")]
    Detach {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot install {signal} handler: {source}")]
    SignalHandler {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::Error,
    },

    #[error("cannot build event loop: {0}")]
    Runtime(#[source] std::io::Error),
}

pub(crate) fn lock_io(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn detach_err(step: &'static str, source: impl Into<std::io::Error>) -> DaemonError {
    DaemonError::Detach {
        step,
        source: source.into(),
    }
}
