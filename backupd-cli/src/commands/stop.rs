//! `backupd stop`: signal the instance recorded in the lock file.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use backupd_daemon::{lock_file_path, stop, wait_for_exit, StopOutcome};

/// Arguments for `backupd stop`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Block until the daemon has released its lock.
    #[arg(long)]
    pub wait: bool,

    /// How long `--wait` waits before giving up.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

impl StopArgs {
    pub fn run(self) -> Result<ExitCode> {
        let lock_path = lock_file_path();
        let pid = match stop(&lock_path).context("failed to stop daemon")? {
            StopOutcome::Signalled { pid } => pid,
            StopOutcome::NotRunning { reason } => {
                eprintln!("backupd is not running ({reason})");
                return Ok(ExitCode::SUCCESS);
            }
        };
        println!("sent SIGTERM to backupd (pid {pid})");

        if self.wait && !wait_for_exit(&lock_path, Duration::from_secs(self.timeout_secs)) {
            eprintln!(
                "backupd (pid {pid}) still holds {} after {}s",
                lock_path.display(),
                self.timeout_secs
            );
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }
}
