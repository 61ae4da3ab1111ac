//! Named cooperative mutual exclusion.
//!
//! [`AdvisoryLock`] only excludes participants that use it. The tick driver
//! runs each tick body inside [`AdvisoryLock::scope`], so a second driver
//! instance blocks instead of racing the first.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A named lock acquired around a closure.
pub struct AdvisoryLock {
    name: String,
    held: Mutex<bool>,
    released: Condvar,
}

impl AdvisoryLock {
    /// Create an unheld lock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// The lock's name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` while holding the lock, waiting for the current holder first.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut held = self.held.lock().expect("advisory lock poisoned");
        while *held {
            held = self.released.wait(held).expect("advisory lock poisoned");
        }
        *held = true;
        drop(held);
        let _release = Release(self);
        f()
    }

    /// Like [`scope`](Self::scope), but give up after `timeout`.
    ///
    /// Returns `None` without running `f` if the lock could not be acquired.
    pub fn try_scope_for<R>(&self, timeout: Duration, f: impl FnOnce() -> R) -> Option<R> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().expect("advisory lock poisoned");
        while *held {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .released
                .wait_timeout(held, remaining)
                .expect("advisory lock poisoned");
            held = guard;
        }
        *held = true;
        drop(held);
        let _release = Release(self);
        Some(f())
    }

    /// Whether some participant currently holds the lock.
    pub fn is_held(&self) -> bool {
        *self.held.lock().expect("advisory lock poisoned")
    }
}

struct Release<'a>(&'a AdvisoryLock);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        // Unwinding through here must not double-panic on a poisoned lock.
        let mut held = match self.0.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *held = false;
        self.0.released.notify_one();
    }
}
