//! Single-slot busy lock gating backend calls.
//!
//! There is no queue and no fairness: a task that fails to acquire the lock
//! abandons what it was about to do and retries on its own cadence.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct BusyLock {
    held: AtomicBool,
}

impl BusyLock {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Non-blocking acquire. Fails immediately if the lock is held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock. Releasing an unheld lock does nothing.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquire and get a token that releases on drop.
    pub fn try_lock(&self) -> Option<BusyToken<'_>> {
        self.try_acquire().then_some(BusyToken { lock: self })
    }
}

impl Default for BusyLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding the [`BusyLock`]. Dropping it releases the lock, so
/// every exit path of the holder releases exactly once.
#[must_use = "dropping the token releases the busy lock"]
pub struct BusyToken<'a> {
    lock: &'a BusyLock,
}

impl Drop for BusyToken<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
