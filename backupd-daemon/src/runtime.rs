//! The main watch loop: wait, decode, dispatch, check for shutdown.
//! Losing the watch on the source directory ends the loop with an error.

use nix::sys::signal::Signal;

use backupd_core::DaemonConfig;

use crate::dispatch::Dispatcher;
use crate::error::DaemonError;
use crate::paths::WAKE_INTERVAL;
use crate::shutdown::ShutdownFlag;
use crate::source::EventSource;

/// Mirror changes until `shutdown` records a signal, then return it.
///
/// Shutdown is only observed between batches, so a batch that has started
/// is always dispatched in full.
pub(crate) async fn watch(
    config: &DaemonConfig,
    shutdown: &ShutdownFlag,
) -> Result<Signal, DaemonError> {
    let tree = &config.tree;
    let mut source = EventSource::open(tree.source())?;
    let dispatcher = Dispatcher::new(tree, config.on_transfer_error);

    tracing::info!(
        source = %tree.source().display(),
        destination = %tree.destination().display(),
        policy = %config.on_transfer_error,
        "watching for changes",
    );

    loop {
        let batch = source.wait_and_decode(WAKE_INTERVAL).await?;
        if !batch.is_idle() {
            let summary = dispatcher.dispatch_batch(batch)?;
            if summary.total() > 0 {
                tracing::debug!(
                    copied = summary.copied,
                    removed = summary.removed,
                    ignored = summary.ignored,
                    failed = summary.failed,
                    "batch applied",
                );
            }
        }

        if let Some(signal) = shutdown.received() {
            return Ok(signal);
        }
        // The source directory is gone; leave restarting to the supervisor.
        source.check_watch()?;
    }
}
