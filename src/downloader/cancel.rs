// CancellationToken - shared stop flag plus the active process slot
//
// The flag is set once and never cleared. The slot holds the pid of the
// process currently running for this job; it is published and cleared
// under the same mutex a stop request takes before signalling, so a stop
// can never target a process that is being replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
    active_pid: Mutex<Option<u32>>,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Request a stop. Idempotent, never blocks on the worker.
    pub fn stop(&self) {
        let slot = self.lock_slot();
        let first = !self.inner.stopped.swap(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();

        if first {
            tracing::info!("[cancel] Stop requested");
        }
        if let Some(pid) = *slot {
            signal_graceful(pid);
        }
    }

    /// Resolves once a stop has been requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Run `launch` while holding the process slot, unless already stopped.
    ///
    /// Returns `None` without calling `launch` if a stop was requested.
    /// On success the pid returned by `launch` is published.
    pub(crate) fn launch_with<T, E>(
        &self,
        launch: impl FnOnce() -> Result<(T, Option<u32>), E>,
    ) -> Option<Result<T, E>> {
        let mut slot = self.lock_slot();
        if self.is_stopped() {
            return None;
        }
        Some(launch().map(|(value, pid)| {
            *slot = pid;
            value
        }))
    }

    /// Clear the process slot; called before the process is reaped
    pub(crate) fn clear_process(&self) {
        *self.lock_slot() = None;
    }

    #[cfg(test)]
    pub(crate) fn active_pid(&self) -> Option<u32> {
        *self.lock_slot()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<u32>> {
        // A panic while holding the slot leaves a plain Option behind
        self.inner
            .active_pid
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(unix)]
fn signal_graceful(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) only sends a signal; a stale pid yields ESRCH, which is ignored
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!("[cancel] SIGTERM to {} failed (process already gone?)", pid);
    }
}

#[cfg(not(unix))]
fn signal_graceful(pid: u32) {
    // No graceful signal here; the worker escalates to a kill once it sees the flag
    tracing::debug!("[cancel] Stop for pid {} left to the worker", pid);
}
