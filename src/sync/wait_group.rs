//! A latch whose count may grow as well as shrink.
//!
//! Grounded on `coke/wait_group.h`: the same count-to-zero-wakes-all shape as [`Latch`](super::Latch),
//! but `add` may be called with any signed delta as long as the running total never goes
//! negative -- a call that would is rejected as a contract error rather than silently clamped.

use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{CokeError, CokeResult};
use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::timer::addr_key;

pub struct WaitGroup {
    count: Mutex<i64>,
}

impl WaitGroup {
    pub fn new(n: i64) -> Self {
        WaitGroup {
            count: Mutex::new(n),
        }
    }

    fn key(&self) -> u64 {
        addr_key(self, 0)
    }

    /// The current count.
    pub fn count(&self) -> i64 {
        *self.count.lock()
    }

    /// Adds `delta` to the running count (negative values are allowed and are how `done` is
    /// implemented). Rejects the call, leaving the count unchanged, if it would drive the total
    /// below zero.
    pub fn add(&self, delta: i64) -> CokeResult<()> {
        let mut guard = self.count.lock();
        let next = *guard + delta;
        if next < 0 {
            return Err(CokeError::NegativeWaitGroup);
        }
        *guard = next;
        let reached_zero = next == 0;
        drop(guard);
        if reached_zero {
            cancel_addr(self.key(), usize::MAX);
        }
        Ok(())
    }

    /// Equivalent to `add(-1)`.
    pub fn done(&self) -> CokeResult<()> {
        self.add(-1)
    }

    /// Waits asynchronously until the count reaches zero.
    pub async fn wait(&self) {
        loop {
            let guard = self.count.lock();
            if *guard <= 0 {
                return;
            }
            let _ = guarded_sleep_addr_infinite(self.key(), false, move || drop(guard)).await;
        }
    }

    /// Waits asynchronously up to `timeout`.
    pub async fn wait_for(&self, timeout: Duration) -> Status {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let guard = self.count.lock();
            if *guard <= 0 {
                return Status::Success;
            }
            if remaining.is_zero() {
                return Status::Timeout;
            }
            match guarded_sleep_addr(self.key(), remaining, false, move || drop(guard)).await {
                Status::Aborted => return Status::Aborted,
                Status::Success if self.count() <= 0 => return Status::Success,
                Status::Success => return Status::Timeout,
                _ => continue,
            }
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        WaitGroup::new(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use crate::task::Task;
    use std::sync::Arc;

    #[test]
    fn add_then_done_reaches_zero() {
        let wg = WaitGroup::new(0);
        wg.add(3).unwrap();
        assert_eq!(wg.count(), 3);
        wg.done().unwrap();
        wg.done().unwrap();
        wg.done().unwrap();
        assert_eq!(wg.count(), 0);
    }

    #[test]
    fn add_below_zero_is_rejected() {
        let wg = WaitGroup::new(1);
        assert!(matches!(wg.add(-2), Err(CokeError::NegativeWaitGroup)));
        assert_eq!(wg.count(), 1);
    }

    #[test]
    fn wait_releases_once_every_worker_is_done() {
        let wg = Arc::new(WaitGroup::new(4));
        for _ in 0..4 {
            let wg = wg.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                wg.done().unwrap();
            });
        }
        sync_wait(Task::new({
            let wg = wg.clone();
            async move { wg.wait().await }
        }));
        assert_eq!(wg.count(), 0);
    }
}
