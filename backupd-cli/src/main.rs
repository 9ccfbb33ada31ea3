//! backupd: mirror one directory into another as files change.
//!
//! # Usage
//!
//! ```text
//! backupd start <config> [--foreground]
//! backupd stop [--wait] [--timeout-secs N]
//! backupd status [--json]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{start::StartArgs, status::StatusArgs, stop::StopArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "backupd",
    version,
    about = "Mirror a directory's files into a backup directory as they change",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon against a configuration file.
    Start(StartArgs),

    /// Ask the running daemon to shut down.
    Stop(StopArgs),

    /// Report whether a daemon currently holds the lock.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => args.run(),
        Commands::Stop(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
