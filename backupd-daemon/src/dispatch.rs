//! Event dispatcher: applies each decoded event to the mirror, in order.
//!
//! No coalescing or deduplication happens here. A Modified followed by a
//! Deleted for the same name runs both actions; the mirror reflects whichever
//! ran last, even if the source has moved on since.

use backupd_core::{ChangeEvent, TransferPolicy, WatchedTree};
use backupd_sync::{self as transfer, CopyReport, RemoveResult};

use crate::error::{DaemonError, DispatchError};

/// What the dispatcher did for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Copied(CopyReport),
    Removed(RemoveResult),
    Ignored,
}

/// Per-batch counters, logged by the main loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub copied: usize,
    pub removed: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.copied + self.removed + self.ignored + self.failed
    }

    fn record(&mut self, action: Action) {
        match action {
            Action::Copied(_) => self.copied += 1,
            Action::Removed(_) => self.removed += 1,
            Action::Ignored => self.ignored += 1,
        }
    }
}

pub struct Dispatcher<'t> {
    tree: &'t WatchedTree,
    policy: TransferPolicy,
}

impl<'t> Dispatcher<'t> {
    pub fn new(tree: &'t WatchedTree, policy: TransferPolicy) -> Self {
        Self { tree, policy }
    }

    /// Apply a single event.
    pub fn dispatch(&self, event: &ChangeEvent) -> Result<Action, DispatchError> {
        if event.kind.is_removal() {
            let dst = self.tree.destination_entry(&event.name)?;
            Ok(Action::Removed(transfer::remove(&dst)?))
        } else if event.kind.is_copy() {
            let src = self.tree.source_entry(&event.name)?;
            let dst = self.tree.destination_entry(&event.name)?;
            Ok(Action::Copied(transfer::mirror(&src, &dst)?))
        } else {
            Ok(Action::Ignored)
        }
    }

    /// Apply every event of a batch in arrival order.
    ///
    /// Under [`TransferPolicy::Skip`] a failed event is logged, counted, and
    /// the rest of the batch still runs. Under [`TransferPolicy::Abort`] the
    /// first failure ends the batch with an error.
    pub fn dispatch_batch<I>(&self, events: I) -> Result<BatchSummary, DaemonError>
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        let mut summary = BatchSummary::default();
        for event in events {
            match self.dispatch(&event) {
                Ok(action) => summary.record(action),
                Err(source) => {
                    let name = event.name.to_string_lossy().into_owned();
                    if self.policy == TransferPolicy::Abort {
                        return Err(DaemonError::Dispatch { name, source });
                    }
                    let content_mirrored = matches!(
                        &source,
                        DispatchError::Transfer(err) if err.is_metadata_only()
                    );
                    tracing::warn!(
                        name = %name,
                        kind = %event.kind,
                        content_mirrored,
                        error = %source,
                        "skipping event that could not be mirrored",
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
