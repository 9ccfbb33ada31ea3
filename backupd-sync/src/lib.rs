//! # backupd-sync
//!
//! Single-file transfer between the watched directory and its mirror.
//!
//! Call [`mirror`] to copy one file's bytes and then its ownership and mode,
//! or [`remove`] to drop one file from the mirror.

pub mod error;
pub mod transfer;

pub use error::TransferError;
pub use transfer::{
    copy, copy_metadata, mirror, remove, CopyReport, RemoveResult, STAGING_BUFFER_BYTES,
};
