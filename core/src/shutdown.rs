use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Process-wide stop signal shared by the supervisor and its workers.
///
/// Workers block on [`Shutdown::wait`] at every suspension point (idle poll,
/// resolver backoff, failure backoff) so a trigger wakes them immediately.
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Clone for Shutdown {
    fn clone(&self) -> Self { Shutdown { inner: self.inner.clone() } }
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown { inner: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `dur` or until triggered. Returns `true` if shutdown was requested.
    pub fn wait(&self, dur: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + dur;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
        }
        *stopped
    }
}
