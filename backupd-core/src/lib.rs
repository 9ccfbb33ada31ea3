//! backupd core library: domain types, configuration loading, errors.
//!
//! - [`types`]: the watched tree, change events, transfer policy
//! - [`config`]: daemon configuration file loading and validation
//! - [`error`]: [`ConfigError`], [`TreeError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::DaemonConfig;
pub use error::{ConfigError, TreeError};
pub use types::{ChangeEvent, ChangeKind, TransferPolicy, WatchedTree};
