//! backupd daemon: singleton lock, inotify event source, dispatcher, and the
//! start/stop lifecycle.

pub mod detach;
pub mod dispatch;
mod error;
pub mod lifecycle;
pub mod lock;
pub mod logging;
pub mod paths;
mod runtime;
pub mod shutdown;
pub mod source;

pub use dispatch::{Action, BatchSummary, Dispatcher};
pub use error::{DaemonError, DispatchError, LockError, WatchError};
pub use lifecycle::{
    start, status, stop, wait_for_exit, DaemonStatus, Phase, StartOptions, StartOutcome,
    StopOutcome,
};
pub use lock::{DaemonLock, LockOutcome};
pub use logging::init_tracing;
pub use paths::lock_file_path;
pub use shutdown::ShutdownFlag;
pub use source::{Batch, EventSource};
