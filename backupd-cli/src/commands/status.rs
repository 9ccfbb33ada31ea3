//! `backupd status`: report the lock holder.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use backupd_daemon::{lock_file_path, status, DaemonStatus};

/// Arguments for `backupd status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let report = status(&lock_file_path()).context("failed to read daemon status")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status")?
            );
        } else {
            print_human(&report);
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_human(report: &DaemonStatus) {
    match report.pid {
        Some(pid) if report.running => println!(
            "backupd: {} (pid {pid})",
            "running".green().bold()
        ),
        _ => println!("backupd: {}", "stopped".red()),
    }
    println!("lock file: {}", report.lock_file.display().to_string().dimmed());
}
