//! Daemon configuration: a small YAML mapping naming the two directories.
//!
//! ```yaml
//! source_dir: /srv/data
//! destination_dir: /backup/data
//! log_file: /var/log/backupd.log     # optional
//! on_transfer_error: skip            # optional: skip | abort
//! ```
//!
//! Older releases read an INI file instead:
//!
//! ```ini
//! [SOURCE DIR]
//! PATH=/srv/data
//! [DESTINATION DIR]
//! PATH=/backup/data
//! ```
//!
//! Each section's `PATH` becomes the matching `source_dir` /
//! `destination_dir` key. Such files are recognised and rejected with
//! [`ConfigError::LegacyFormat`] rather than a YAML syntax error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{TransferPolicy, WatchedTree};

/// On-disk shape. Every field is optional so that missing keys produce
/// [`ConfigError::MissingKey`] rather than a generic parse error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    source_dir: Option<PathBuf>,
    destination_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    #[serde(default)]
    on_transfer_error: TransferPolicy,
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub tree: WatchedTree,
    pub log_file: Option<PathBuf>,
    pub on_transfer_error: TransferPolicy,
}

impl DaemonConfig {
    /// Read, parse, and resolve the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse(&text, path)
    }

    /// Parse configuration text; `origin` is only used for error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        if is_legacy_ini(text) {
            return Err(ConfigError::LegacyFormat {
                path: origin.to_path_buf(),
            });
        }

        // An empty document deserializes to unit, not a mapping.
        let raw: RawConfig = if text.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?
        };

        let source_dir = required(raw.source_dir, "source_dir", origin)?;
        let destination_dir = required(raw.destination_dir, "destination_dir", origin)?;
        let tree = WatchedTree::resolve(&source_dir, &destination_dir)?;

        Ok(Self {
            tree,
            // Anchored now: the daemon changes directory to `/` when it detaches.
            log_file: raw
                .log_file
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| std::path::absolute(&p).unwrap_or(p)),
            on_transfer_error: raw.on_transfer_error,
        })
    }
}

fn is_legacy_ini(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        line.eq_ignore_ascii_case("[SOURCE DIR]") || line.eq_ignore_ascii_case("[DESTINATION DIR]")
    })
}

fn required(
    value: Option<PathBuf>,
    key: &'static str,
    origin: &Path,
) -> Result<PathBuf, ConfigError> {
    match value {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(ConfigError::MissingKey {
            key,
            path: origin.to_path_buf(),
        }),
    }
}
