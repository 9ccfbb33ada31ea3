//! Copy and removal of single files between the two trees.
//!
//! ## `mirror`: 2-step protocol
//!
//! 1. Stream the source bytes into the truncated destination through a fixed
//!    staging buffer. Every write must take the whole chunk just read.
//! 2. Re-read the source metadata and apply its owner, group, and mode to
//!    the destination.
//!
//! A failure in step 1 leaves whatever was already written in place; there
//! is no rollback. A failure in step 2 is reported separately so callers can
//! tell "content copied, metadata stale" apart from a failed copy.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::error::{io_err, TransferError};

/// Size of the staging buffer used while streaming file content.
pub const STAGING_BUFFER_BYTES: usize = 8 * 1024;

/// Permission bits carried over from the source (rwx for all classes plus
/// setuid, setgid, and sticky).
const MODE_MASK: u32 = 0o7777;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a successful [`mirror`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// Permission bits applied to the destination.
    pub mode: u32,
}

/// Outcome of [`remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    /// The destination file existed and was deleted.
    Removed,
    /// Nothing to delete; treated as success.
    AlreadyAbsent,
}

// ---------------------------------------------------------------------------
// mirror / copy
// ---------------------------------------------------------------------------

/// Copy content, then ownership and mode, from `src` to `dst`.
pub fn mirror(src: &Path, dst: &Path) -> Result<CopyReport, TransferError> {
    let bytes = copy(src, dst)?;
    let mode = copy_metadata(src, dst)?;
    tracing::info!("mirrored: {} ({bytes} bytes, mode {mode:o})", dst.display());
    Ok(CopyReport { bytes, mode })
}

/// Stream the bytes of `src` into `dst`, creating or truncating `dst`.
///
/// Both ends are opened non-blocking and must be regular files, so a FIFO or
/// device node in either tree fails fast instead of stalling the caller.
///
/// Returns the number of bytes written.
pub fn copy(src: &Path, dst: &Path) -> Result<u64, TransferError> {
    let mut input = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(src)
        .map_err(|e| source_err(src, e))?;
    ensure_regular(&input, src)?;

    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(dst)
        .map_err(|e| io_err(dst, e))?;
    ensure_regular(&output, dst)?;

    let bytes = stream(&mut input, &mut output, src, dst)?;
    output.flush().map_err(|e| io_err(dst, e))?;
    tracing::debug!("copied {bytes} bytes: {} -> {}", src.display(), dst.display());
    Ok(bytes)
}

fn source_err(src: &Path, e: std::io::Error) -> TransferError {
    if e.kind() == ErrorKind::NotFound {
        TransferError::SourceMissing {
            path: src.to_path_buf(),
        }
    } else {
        io_err(src, e)
    }
}

fn ensure_regular(file: &File, path: &Path) -> Result<(), TransferError> {
    let meta = file.metadata().map_err(|e| io_err(path, e))?;
    check_regular(&meta, path)
}

fn check_regular(meta: &fs::Metadata, path: &Path) -> Result<(), TransferError> {
    let file_type = meta.file_type();
    if file_type.is_file() {
        Ok(())
    } else {
        Err(TransferError::NotRegular {
            path: path.to_path_buf(),
            kind: describe(file_type),
        })
    }
}

fn describe(file_type: fs::FileType) -> &'static str {
    if file_type.is_dir() {
        "directory"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else if file_type.is_char_device() {
        "character device"
    } else if file_type.is_block_device() {
        "block device"
    } else {
        "special file"
    }
}

fn stream<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    src: &Path,
    dst: &Path,
) -> Result<u64, TransferError> {
    let mut buffer = [0u8; STAGING_BUFFER_BYTES];
    let mut total = 0u64;

    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(src, e)),
        };

        // One write per chunk; anything short of the full chunk means the
        // destination could not take it (disk full, quota, I/O error).
        let written = loop {
            match output.write(&buffer[..read]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_err(dst, e)),
            }
        };
        if written != read {
            return Err(TransferError::ShortWrite {
                path: dst.to_path_buf(),
                expected: read,
                written,
            });
        }
        total += written as u64;
    }

    Ok(total)
}

// ---------------------------------------------------------------------------
// copy_metadata
// ---------------------------------------------------------------------------

/// Apply the current owner, group, and permission bits of `src` to `dst`.
///
/// Ownership is applied first because `chown` may clear setuid/setgid bits.
/// Mode is still applied when `chown` fails, and the `chown` failure is
/// returned afterwards.
pub fn copy_metadata(src: &Path, dst: &Path) -> Result<u32, TransferError> {
    let meta = fs::metadata(src).map_err(|e| source_err(src, e))?;
    check_regular(&meta, src)?;
    let mode = meta.mode() & MODE_MASK;

    let owner = std::os::unix::fs::chown(dst, Some(meta.uid()), Some(meta.gid()));
    fs::set_permissions(dst, Permissions::from_mode(mode)).map_err(|source| {
        TransferError::Metadata {
            path: dst.to_path_buf(),
            what: "permissions",
            source,
        }
    })?;
    owner.map_err(|source| TransferError::Metadata {
        path: dst.to_path_buf(),
        what: "ownership",
        source,
    })?;

    Ok(mode)
}

// ---------------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------------

/// Delete `dst`. A file that is already gone is not an error.
pub fn remove(dst: &Path) -> Result<RemoveResult, TransferError> {
    match fs::remove_file(dst) {
        Ok(()) => {
            tracing::info!("removed: {}", dst.display());
            Ok(RemoveResult::Removed)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("already absent: {}", dst.display());
            Ok(RemoveResult::AlreadyAbsent)
        }
        Err(source) => Err(TransferError::Remove {
            path: dst.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Accepts at most `limit` bytes per `write` call.
    struct Trickle {
        limit: usize,
        sink: Vec<u8>,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.sink.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails with `Interrupted` once before behaving like a Vec.
    struct InterruptOnce {
        tripped: bool,
        sink: Vec<u8>,
    }

    impl Write for InterruptOnce {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.tripped {
                self.tripped = true;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            self.sink.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn paths() -> (PathBuf, PathBuf) {
        (PathBuf::from("/src/f"), PathBuf::from("/dst/f"))
    }

    #[test]
    fn stream_spans_multiple_staging_buffers() {
        let (src, dst) = paths();
        let payload: Vec<u8> = (0..STAGING_BUFFER_BYTES * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        let mut sink = Vec::new();
        let n = stream(&mut Cursor::new(payload.clone()), &mut sink, &src, &dst).expect("stream");
        assert_eq!(n, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[test]
    fn short_write_is_fatal_for_the_operation() {
        let (src, dst) = paths();
        let mut sink = Trickle {
            limit: 10,
            sink: Vec::new(),
        };
        let err = stream(&mut Cursor::new(vec![7u8; 64]), &mut sink, &src, &dst).unwrap_err();
        match err {
            TransferError::ShortWrite {
                path,
                expected,
                written,
            } => {
                assert_eq!(path, dst);
                assert_eq!(expected, 64);
                assert_eq!(written, 10);
            }
            other => panic!("expected ShortWrite, got {other}"),
        }
        // Bytes already written stay written.
        assert_eq!(sink.sink.len(), 10);
    }

    #[test]
    fn interrupted_write_is_retried() {
        let (src, dst) = paths();
        let mut sink = InterruptOnce {
            tripped: false,
            sink: Vec::new(),
        };
        stream(&mut Cursor::new(b"hello".to_vec()), &mut sink, &src, &dst).expect("stream");
        assert_eq!(sink.sink, b"hello");
    }

    #[test]
    fn copy_truncates_existing_destination() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"new").expect("write src");
        fs::write(&dst, b"much longer old content").expect("write dst");

        assert_eq!(copy(&src, &dst).expect("copy"), 3);
        assert_eq!(fs::read(&dst).expect("read dst"), b"new");
    }

    #[test]
    fn copy_of_missing_source_leaves_destination_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let dst = dir.path().join("dst.txt");
        fs::write(&dst, b"keep").expect("write dst");

        let err = copy(&dir.path().join("gone.txt"), &dst).unwrap_err();
        assert!(matches!(err, TransferError::SourceMissing { .. }), "got: {err}");
        assert_eq!(fs::read(&dst).expect("read dst"), b"keep");
    }

    #[test]
    fn copy_into_missing_directory_is_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("src.txt");
        fs::write(&src, b"x").expect("write src");

        let err = copy(&src, &dir.path().join("no-such-dir").join("dst.txt")).unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }), "got: {err}");
        assert!(!err.is_metadata_only());
    }

    #[test]
    fn copy_metadata_applies_mode_and_owner() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("src.sh");
        let dst = dir.path().join("dst.sh");
        fs::write(&src, b"#!/bin/sh\n").expect("write src");
        fs::write(&dst, b"#!/bin/sh\n").expect("write dst");
        fs::set_permissions(&src, Permissions::from_mode(0o750)).expect("chmod src");
        fs::set_permissions(&dst, Permissions::from_mode(0o600)).expect("chmod dst");

        assert_eq!(copy_metadata(&src, &dst).expect("copy metadata"), 0o750);

        let src_meta = fs::metadata(&src).expect("stat src");
        let dst_meta = fs::metadata(&dst).expect("stat dst");
        assert_eq!(dst_meta.mode() & MODE_MASK, 0o750);
        assert_eq!(dst_meta.uid(), src_meta.uid());
        assert_eq!(dst_meta.gid(), src_meta.gid());
    }

    #[test]
    fn copy_metadata_on_missing_destination_is_metadata_error() {
        let dir = TempDir::new().expect("tempdir");
        let src = dir.path().join("src.txt");
        fs::write(&src, b"x").expect("write src");

        let err = copy_metadata(&src, &dir.path().join("absent")).unwrap_err();
        assert!(err.is_metadata_only(), "got: {err}");
    }

    #[test]
    fn remove_twice_is_success_both_times() {
        let dir = TempDir::new().expect("tempdir");
        let dst = dir.path().join("a.txt");
        fs::write(&dst, b"hi").expect("write");

        assert_eq!(remove(&dst).expect("first remove"), RemoveResult::Removed);
        assert_eq!(remove(&dst).expect("second remove"), RemoveResult::AlreadyAbsent);
        assert!(!dst.exists());
    }
}
