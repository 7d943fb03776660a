use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Registry for the single in-flight transfer subprocess.
///
/// The liveness probe reads it to report whether a transfer is running and
/// the shutdown handler uses it to reach the subprocess. A termination
/// request made before the subprocess registers is delivered on
/// registration.
#[derive(Debug, Default)]
pub struct TransferSlot {
    in_flight: Mutex<Option<InFlight>>,
    terminate_requested: AtomicBool,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    pid: Option<u32>,
}

impl TransferSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transfer subprocess is currently registered
    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether [`TransferSlot::terminate`] has been called
    pub fn is_terminating(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Register a running subprocess until the returned guard drops
    pub fn occupy(&self, pid: Option<u32>) -> SlotGuard<'_> {
        let mut in_flight = self.lock();
        *in_flight = Some(InFlight { pid });

        if self.is_terminating() {
            if let Some(pid) = pid {
                send_terminate(pid);
            }
        }

        SlotGuard { slot: self }
    }

    /// Ask the in-flight subprocess, if any, to terminate.
    ///
    /// The request is sticky: any subprocess registered afterwards is
    /// signalled immediately.
    pub fn terminate(&self) {
        let in_flight = self.lock();
        self.terminate_requested.store(true, Ordering::SeqCst);

        match *in_flight {
            Some(InFlight { pid: Some(pid) }) => {
                tracing::info!(target: "transfer", pid, "Terminating in-flight transfer");
                send_terminate(pid);
            }
            Some(InFlight { pid: None }) => {
                tracing::warn!(target: "transfer", "In-flight transfer has no process id to signal");
            }
            None => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        // The guarded value is plain data, so a poisoned lock is still usable
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the slot when the transfer ends
pub struct SlotGuard<'a> {
    slot: &'a TransferSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Politely ask a process to exit (SIGTERM)
pub(crate) fn send_terminate(pid: u32) {
    signal_process(pid, false);
}

/// Kill a process that ignored [`send_terminate`] (SIGKILL)
pub(crate) fn send_kill(pid: u32) {
    signal_process(pid, true);
}

#[cfg(unix)]
fn signal_process(pid: u32, force: bool) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(target: "transfer", pid, "Process id out of range");
        return;
    };

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = kill(Pid::from_raw(raw), signal) {
        tracing::warn!(target: "transfer", pid, %signal, error = %e, "Failed to signal transfer process");
    }
}

#[cfg(not(unix))]
fn signal_process(pid: u32, _force: bool) {
    tracing::warn!(target: "transfer", pid, "Signalling transfer processes is only supported on Unix");
}
