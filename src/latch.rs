//! Countdown latch.
//!
//! A [`CountDownLatch`] is created with a count and blocks waiters until
//! [`CountDownLatch::count_down`] has been called that many times. It is built
//! from a `parking_lot` mutex and condition variable, so waiting threads sleep
//! instead of spinning.
//!
//! # Examples
//!
//! ```
//! use prometheus_timer_pool::CountDownLatch;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let latch = Arc::new(CountDownLatch::new(3));
//!
//! for _ in 0..3 {
//!     let latch = Arc::clone(&latch);
//!     thread::spawn(move || latch.count_down());
//! }
//!
//! latch.wait();
//! assert_eq!(latch.count(), 0);
//! ```

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Blocks threads until a fixed number of decrements have happened.
///
/// Once the count reaches zero it stays there: further `count_down` calls are
/// no-ops and every later `wait` returns immediately.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<u32>,
    cvar: Condvar,
}

impl CountDownLatch {
    /// Creates a latch that opens after `count` decrements.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            count: Mutex::new(count),
            cvar: Condvar::new(),
        }
    }

    /// Decrements the count, waking all waiters when it reaches zero.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.cvar.notify_all();
        }
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        self.cvar.wait_while(&mut count, |c| *c > 0);
    }

    /// Blocks until the count reaches zero or `timeout` elapses.
    ///
    /// Returns `true` if the latch opened, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = crate::util::clock::deadline_after(timeout);
        let mut count = self.count.lock();
        while *count > 0 {
            if self.cvar.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

impl Default for CountDownLatch {
    /// A latch that needs a single `count_down`.
    fn default() -> Self {
        Self::new(1)
    }
}
