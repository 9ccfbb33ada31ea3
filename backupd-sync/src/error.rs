//! Error types for backupd-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from a single transfer operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source file vanished (or never existed) before it could be opened.
    #[error("source file missing: {path}")]
    SourceMissing { path: PathBuf },

    /// The path names something other than a regular file (FIFO, device,
    /// socket, directory). Never opened for blocking I/O.
    #[error("not a regular file ({kind}): {path}")]
    NotRegular { path: PathBuf, kind: &'static str },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination accepted fewer bytes than were read from the source.
    #[error("short write to {path}: wrote {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        expected: usize,
        written: usize,
    },

    /// The destination file exists but could not be deleted.
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content was copied but ownership or mode could not be propagated.
    #[error("failed to copy {what} onto {path}: {source}")]
    Metadata {
        path: PathBuf,
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Whether the destination content is intact and only metadata differs.
    pub fn is_metadata_only(&self) -> bool {
        matches!(self, Self::Metadata { .. })
    }
}

/// Convenience constructor for [`TransferError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TransferError {
    TransferError::Io {
        path: path.into(),
        source,
    }
}
