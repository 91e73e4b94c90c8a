//! Shared shutdown coordination.
//!
//! Each engine runs two or three cooperating workers over a single shutdown
//! flag. The flag is paired with a condvar so `Shutdown` can pulse-wait
//! instead of busy-polling, generalized from "cancel one blocking read" to
//! "tell N worker loops to wind down and tell me when they have."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default pulse interval `Shutdown` waits between checks of worker exit
/// flags.
pub const SHUTDOWN_PULSE: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct ShutdownFlag {
    inner: Arc<Inner>,
}

struct Inner {
    set: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                set: AtomicBool::new(false),
                lock: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn signal(&self) {
        self.inner.set.store(true, Ordering::SeqCst);
        self.inner.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Blocks up to `timeout`, waking early if [`signal`](Self::signal) is
    /// called. Used by workers to sleep between retries/polls without
    /// outliving a shutdown by a whole sleep interval.
    pub fn wait_timeout(&self, timeout: Duration) {
        if self.is_set() {
            return;
        }
        let guard = self.inner.lock.lock().unwrap();
        let _ = self.inner.condvar.wait_timeout(guard, timeout);
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-worker flag a worker thread sets just before its loop returns, so
/// that `Shutdown` can tell the difference between "told to stop" and
/// "actually stopped."
#[derive(Clone, Default)]
pub struct ExitFlag(Arc<AtomicBool>);

impl ExitFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn mark_exited(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocks the calling thread until every flag in `flags` reports exited,
/// pulse-waiting on `shutdown` at [`SHUTDOWN_PULSE`] intervals so the call
/// returns promptly once the last worker notices the signal.
pub fn wait_for_exit(shutdown: &ShutdownFlag, flags: &[ExitFlag]) {
    loop {
        if flags.iter().all(ExitFlag::has_exited) {
            return;
        }
        shutdown.wait_timeout(SHUTDOWN_PULSE);
    }
}
