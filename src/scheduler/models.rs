use crate::transfer::TransferSlot;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Process-wide scheduler state shared with the shutdown handler and the
/// liveness endpoint
#[derive(Debug)]
pub struct SchedulerContext {
    running: AtomicBool,
    cancel: CancellationToken,
    slot: TransferSlot,
}

impl SchedulerContext {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            slot: TransferSlot::new(),
        }
    }

    /// False once shutdown has been requested
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a transfer subprocess is in flight
    pub fn is_syncing(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn slot(&self) -> &TransferSlot {
        &self.slot
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop starting new work and ask the in-flight transfer to terminate
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(target: "scheduler", "Shutdown requested");
        }
        self.cancel.cancel();
        self.slot.terminate();
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new()
    }
}
