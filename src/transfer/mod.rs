//! Transfer execution: the rsync subprocess, its output statistics and the
//! registry of the in-flight run.

mod executor;
mod slot;
mod stats;

pub use executor::RsyncExecutor;
pub use slot::{SlotGuard, TransferSlot};
pub use stats::{TransferStats, parse_stats};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Parameters of one transfer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Mirror name, used for logging
    pub label: String,
    pub source: String,
    pub destination: PathBuf,
    /// I/O stall timeout handed to the transfer tool
    pub timeout: Duration,
    /// KB/s, 0 = unlimited
    pub bandwidth_limit_kbs: u32,
}

/// Result of one transfer run
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub success: bool,
    /// Combined stdout and stderr in arrival order (tail only)
    pub output: String,
    pub stats: TransferStats,
}

impl TransferOutcome {
    pub fn failed_to_launch(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            stats: TransferStats::default(),
        }
    }
}

/// Something that can synchronize a source into a destination.
///
/// Implementations never return errors: any failure, including failing to
/// start, is reported as an unsuccessful [`TransferOutcome`]. While running
/// they register with `slot` so the run can be observed and terminated.
pub trait Transfer: Send + Sync {
    fn execute(
        &self,
        request: &TransferRequest,
        slot: &TransferSlot,
    ) -> impl Future<Output = TransferOutcome> + Send;
}

impl<T: Transfer> Transfer for Arc<T> {
    fn execute(
        &self,
        request: &TransferRequest,
        slot: &TransferSlot,
    ) -> impl Future<Output = TransferOutcome> + Send {
        (**self).execute(request, slot)
    }
}
