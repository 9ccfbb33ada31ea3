//! `backupd start`: load the configuration, then hand over to the daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use backupd_core::DaemonConfig;
use backupd_daemon::{init_tracing, lock_file_path, start, StartOptions, StartOutcome};

/// Arguments for `backupd start`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// YAML file naming the source and destination directories.
    pub config: PathBuf,

    /// Stay attached to the terminal instead of forking into the background.
    #[arg(long)]
    pub foreground: bool,
}

impl StartArgs {
    pub fn run(self) -> Result<ExitCode> {
        // Resolved before detaching, while relative paths still mean something.
        let config = DaemonConfig::load(&self.config)
            .with_context(|| format!("failed to load configuration {}", self.config.display()))?;
        init_tracing(config.log_file.as_deref());

        let options = StartOptions {
            config,
            lock_path: lock_file_path(),
            detach: !self.foreground,
        };
        let outcome = start(&options).context("daemon exited with error")?;

        if let StartOutcome::AlreadyRunning { owner } = outcome {
            match owner {
                Some(pid) => eprintln!("backupd is already running (pid {pid})"),
                None => eprintln!("backupd is already running"),
            }
        }
        Ok(ExitCode::from(outcome.exit_code()))
    }
}
