//! Signal-driven shutdown flag.
//!
//! Signal delivery only records which signal arrived. The main loop polls
//! the flag after every wait cycle and performs all cleanup itself, so an
//! in-flight transfer always finishes before shutdown proceeds.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::error::DaemonError;

/// No signal received yet.
const NONE: i32 = 0;

#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    received: Arc<AtomicI32>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signal` as the shutdown cause. The first signal wins.
    pub fn trigger(&self, signal: Signal) {
        let _ = self.received.compare_exchange(
            NONE,
            signal as i32,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// The signal that requested shutdown, if any.
    pub fn received(&self) -> Option<Signal> {
        match self.received.load(Ordering::SeqCst) {
            NONE => None,
            raw => Signal::try_from(raw).ok(),
        }
    }

    /// Route SIGTERM and SIGINT into this flag. Must run inside the runtime.
    pub fn install(&self) -> Result<(), DaemonError> {
        let mut terminate =
            signal(SignalKind::terminate()).map_err(|source| DaemonError::SignalHandler {
                signal: Signal::SIGTERM.as_str(),
                source,
            })?;
        let mut interrupt =
            signal(SignalKind::interrupt()).map_err(|source| DaemonError::SignalHandler {
                signal: Signal::SIGINT.as_str(),
                source,
            })?;

        let flag = self.clone();
        tokio::spawn(async move {
            let received = tokio::select! {
                _ = terminate.recv() => Signal::SIGTERM,
                _ = interrupt.recv() => Signal::SIGINT,
            };
            tracing::info!(signal = received.as_str(), "shutdown requested");
            flag.trigger(received);
        });
        Ok(())
    }
}

/// Conventional exit status for a process ended by `signal`.
pub fn exit_status(signal: Signal) -> u8 {
    (128 + signal as i32).clamp(0, u8::MAX as i32) as u8
}
