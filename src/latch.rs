//! Countdown latch with a spin-then-park wait.
//!
//! The submitter resets the counter before each dispatch and waits for the
//! workers to count down. Because worker tasks usually finish within
//! microseconds, `wait` burns a short spin budget before taking the mutex
//! and parking on the condition variable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const SPINS_PER_CLOCK_CHECK: u32 = 64;

/// A counter that blocks waiters until it reaches zero.
pub struct CountdownLatch {
    count: AtomicUsize,
    lock: Mutex<()>,
    on_zero: Condvar,
    spin_budget: Duration,
}

impl CountdownLatch {
    /// Creates a latch at zero with the given spin budget for `wait`.
    pub fn new(spin_budget: Duration) -> Self {
        CountdownLatch {
            count: AtomicUsize::new(0),
            lock: Mutex::new(()),
            on_zero: Condvar::new(),
            spin_budget,
        }
    }

    /// Sets the counter. Callers must ensure no thread is concurrently
    /// counting down; the pool does this between dispatch phases.
    pub fn reset(&self, count: usize) {
        self.count.store(count, Ordering::Release);
    }

    /// Current counter value.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Decrements the counter, waking blocked waiters when it hits zero.
    pub fn count_down(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Taking the lock orders this notify after a concurrent waiter's
            // recheck, so the wakeup cannot slip between its load and park.
            let _guard = self.lock.lock().unwrap();
            self.on_zero.notify_all();
        }
    }

    /// Blocks until the counter reaches zero, spinning first.
    pub fn wait(&self) {
        let start = Instant::now();
        loop {
            for _ in 0..SPINS_PER_CLOCK_CHECK {
                if self.count.load(Ordering::Acquire) == 0 {
                    return;
                }
                std::hint::spin_loop();
            }
            if start.elapsed() >= self.spin_budget {
                break;
            }
        }

        let mut guard = self.lock.lock().unwrap();
        while self.count.load(Ordering::Acquire) != 0 {
            guard = self.on_zero.wait(guard).unwrap();
        }
    }
}
