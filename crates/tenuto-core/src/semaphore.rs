//! Counting semaphore built on a mutex and condition variable.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A counting wait/signal primitive.
///
/// `release(n)` adds `n` permits and wakes up to `n` waiters; `acquire`
/// blocks until a permit is available and takes it.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += count;
        if count == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Returns `false` if no permit became available within `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.available.wait_for(&mut permits, timeout).timed_out() && *permits == 0 {
                return false;
            }
        }
        *permits -= 1;
        true
    }

    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }
}
