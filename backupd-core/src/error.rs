//! Error types for backupd-core.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and validating the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file itself does not exist.
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Underlying I/O failure reading the configuration file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error; includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An INI file with `[SOURCE DIR]` / `[DESTINATION DIR]` sections, the
    /// layout older backupd releases read.
    #[error(
        "{path} uses the old INI layout; rewrite it as YAML with `source_dir` and `destination_dir` keys"
    )]
    LegacyFormat { path: PathBuf },

    /// A required key was absent or empty.
    #[error("configuration key `{key}` is missing in {path}")]
    MissingKey { key: &'static str, path: PathBuf },

    /// A configured directory could not be resolved to an absolute path.
    #[error("cannot resolve `{key}` ({path}): {source}")]
    Unresolvable {
        key: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured directory resolved to something other than a directory.
    #[error("`{key}` is not a directory: {path}")]
    NotADirectory { key: &'static str, path: PathBuf },

    /// Source and destination resolve to the same directory.
    #[error("source and destination are the same directory: {path}")]
    SameDirectory { path: PathBuf },
}

/// Errors raised when mapping an event name onto the watched tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The name is not a single plain file name (empty, `.`, `..`, or has separators).
    #[error("refusing to mirror entry with invalid name {name:?}")]
    InvalidEntryName { name: OsString },
}
