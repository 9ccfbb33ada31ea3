//! Event source: one non-recursive inotify watch on the source directory.
//!
//! Each wake performs at most one read of the notification channel. The
//! records of that read are exposed as a [`Batch`], a lazy iterator that
//! decodes one [`ChangeEvent`] per record in arrival order and is exhausted
//! exactly at the end of the bytes the kernel returned.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inotify::{EventMask, Events, Inotify, WatchMask};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use backupd_core::{ChangeEvent, ChangeKind};

use crate::error::WatchError;

/// Room for a burst of records in a single read. One record is at most
/// 16 bytes of header plus NAME_MAX + 1 bytes of name.
pub const BATCH_BUFFER_BYTES: usize = 64 * 1024;

pub struct EventSource {
    channel: AsyncFd<Inotify>,
    watch_path: PathBuf,
    buffer: Vec<u8>,
    /// Set once the kernel reports the watch gone (directory deleted or
    /// unmounted). Nothing can arrive on the channel after that.
    watch_lost: bool,
}

impl EventSource {
    /// Open the notification channel and watch the direct children of
    /// `watch_path` for create, modify, delete, and rename in/out.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(watch_path: &Path) -> Result<Self, WatchError> {
        let inotify = Inotify::init().map_err(WatchError::Init)?;
        inotify
            .watches()
            .add(watch_path, watch_mask())
            .map_err(|source| WatchError::AddWatch {
                path: watch_path.to_path_buf(),
                source,
            })?;
        let channel =
            AsyncFd::with_interest(inotify, Interest::READABLE).map_err(WatchError::Init)?;

        tracing::debug!(path = %watch_path.display(), "watch registered");
        Ok(Self {
            channel,
            watch_path: watch_path.to_path_buf(),
            buffer: vec![0u8; BATCH_BUFFER_BYTES],
            watch_lost: false,
        })
    }

    /// Fails once a decoded batch has reported the watch removed.
    pub fn check_watch(&self) -> Result<(), WatchError> {
        if self.watch_lost {
            return Err(WatchError::WatchRemoved {
                path: self.watch_path.clone(),
            });
        }
        Ok(())
    }

    /// Wait up to `timeout` for the channel to become readable, then read
    /// one batch.
    ///
    /// A timeout, a spurious wake, or an interrupted wait all yield an idle
    /// (empty) batch. A zero-length read means the kernel closed the channel
    /// and is fatal.
    pub async fn wait_and_decode(&mut self, timeout: Duration) -> Result<Batch<'_>, WatchError> {
        let mut guard = match tokio::time::timeout(timeout, self.channel.readable_mut()).await {
            Err(_elapsed) => return Ok(Batch::idle(&mut self.watch_lost)),
            Ok(Ok(guard)) => guard,
            Ok(Err(err)) if err.kind() == ErrorKind::Interrupted => {
                return Ok(Batch::idle(&mut self.watch_lost))
            }
            Ok(Err(err)) => return Err(WatchError::Wait(err)),
        };

        match guard.get_inner_mut().read_events(&mut self.buffer) {
            Ok(events) => Ok(Batch::new(events, &mut self.watch_lost)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                guard.clear_ready();
                Ok(Batch::idle(&mut self.watch_lost))
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                Ok(Batch::idle(&mut self.watch_lost))
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(WatchError::ChannelClosed),
            Err(err) => Err(WatchError::Read(err)),
        }
    }
}

fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::MODIFY
        | WatchMask::DELETE
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
        | WatchMask::ONLYDIR
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// The decoded records of one read. Finite and not restartable.
pub struct Batch<'a> {
    events: Option<Events<'a>>,
    watch_lost: &'a mut bool,
}

impl<'a> Batch<'a> {
    fn new(events: Events<'a>, watch_lost: &'a mut bool) -> Self {
        Self {
            events: Some(events),
            watch_lost,
        }
    }

    fn idle(watch_lost: &'a mut bool) -> Self {
        Self {
            events: None,
            watch_lost,
        }
    }

    /// True when the wake produced no read at all (timeout or spurious wake).
    pub fn is_idle(&self) -> bool {
        self.events.is_none()
    }
}

impl Iterator for Batch<'_> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<ChangeEvent> {
        let event = self.events.as_mut()?.next()?;
        if event.mask.contains(EventMask::IGNORED) {
            *self.watch_lost = true;
        }
        Some(decode(event.mask, event.name))
    }
}

/// Turn one raw record into a [`ChangeEvent`].
pub(crate) fn decode(mask: EventMask, name: Option<&OsStr>) -> ChangeEvent {
    if mask.contains(EventMask::Q_OVERFLOW) {
        tracing::warn!("notification queue overflowed; some changes were lost");
    } else if mask.contains(EventMask::IGNORED) {
        tracing::error!("kernel dropped the watch on the source directory");
    }
    ChangeEvent::new(classify(mask), name.unwrap_or_default())
}

/// Map a raw event mask to a [`ChangeKind`]. Directory events are never
/// mirrored and classify as [`ChangeKind::Other`].
pub(crate) fn classify(mask: EventMask) -> ChangeKind {
    if mask.contains(EventMask::ISDIR) {
        ChangeKind::Other
    } else if mask.contains(EventMask::CREATE) {
        ChangeKind::Created
    } else if mask.contains(EventMask::MODIFY) {
        ChangeKind::Modified
    } else if mask.contains(EventMask::DELETE) {
        ChangeKind::Deleted
    } else if mask.contains(EventMask::MOVED_TO) {
        ChangeKind::MovedIn
    } else if mask.contains(EventMask::MOVED_FROM) {
        ChangeKind::MovedOut
    } else {
        ChangeKind::Other
    }
}
