//! A single-use countdown latch: `n` calls to `count_down` release every waiter.
//!
//! Grounded on `coke/wait_group.h`'s count-to-zero-wakes-all shape, specialized to the
//! non-growing case. Carries its own `std::sync::Condvar` pair in addition to the usual
//! address-keyed sleep loop: [`Latch::blocking_wait`] is used by `sync_wait`, whose calling OS
//! thread is not assumed to be polling any future at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar as StdCondvar, Mutex as StdMutex};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::timer::addr_key;

pub struct Latch {
    count: AtomicUsize,
    /// Serializes `count_down`'s decrement against an async waiter's check-then-register step,
    /// so a `count_down` reaching zero can never run in the gap between a waiter finding the
    /// count still nonzero and that waiter's sleep actually being registered.
    async_guard: Mutex<()>,
    blocking: StdMutex<()>,
    blocking_cond: StdCondvar,
}

impl Latch {
    /// Creates a latch that releases its waiters after `n` calls to [`count_down`](Self::count_down).
    /// A latch created with `n == 0` is already released.
    pub fn new(n: usize) -> Self {
        Latch {
            count: AtomicUsize::new(n),
            async_guard: Mutex::new(()),
            blocking: StdMutex::new(()),
            blocking_cond: StdCondvar::new(),
        }
    }

    fn key(&self) -> u64 {
        addr_key(self, 0)
    }

    /// The current count. Never increases.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Decrements the count by one, releasing every waiter once it reaches zero. A no-op once
    /// the count has already reached zero (extra calls are never an error).
    pub fn count_down(&self) {
        let guard = self.async_guard.lock();
        loop {
            let cur = self.count.load(Ordering::Acquire);
            if cur == 0 {
                return;
            }
            if self
                .count
                .compare_exchange(cur, cur - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                drop(guard);
                if cur == 1 {
                    cancel_addr(self.key(), usize::MAX);
                    let _guard = self.blocking.lock().unwrap();
                    self.blocking_cond.notify_all();
                }
                return;
            }
        }
    }

    /// Waits asynchronously until the count reaches zero.
    pub async fn wait(&self) {
        loop {
            let guard = self.async_guard.lock();
            if self.count() == 0 {
                return;
            }
            let _ = guarded_sleep_addr_infinite(self.key(), false, move || drop(guard)).await;
        }
    }

    /// Waits asynchronously up to `timeout`. `Status::Success` if the count reached zero in
    /// time, `Status::Timeout` otherwise.
    pub async fn wait_for(&self, timeout: Duration) -> Status {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let guard = self.async_guard.lock();
            if self.count() == 0 {
                return Status::Success;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Status::Timeout;
            }
            match guarded_sleep_addr(self.key(), remaining, false, move || drop(guard)).await {
                Status::Aborted => return Status::Aborted,
                Status::Success if self.count() == 0 => return Status::Success,
                Status::Success => return Status::Timeout,
                _ => continue,
            }
        }
    }

    /// Blocks the calling OS thread (not a coke task) until the count reaches zero. Used by
    /// `sync_wait`, whose caller may not be running inside any executor at all.
    pub fn blocking_wait(&self) {
        let mut guard = self.blocking.lock().unwrap();
        while self.count() > 0 {
            guard = self.blocking_cond.wait(guard).unwrap();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use crate::task::Task;
    use std::sync::Arc;

    #[test]
    fn count_down_to_zero_releases_waiters() {
        let latch = Arc::new(Latch::new(3));
        for _ in 0..3 {
            latch.count_down();
        }
        assert_eq!(latch.count(), 0);
        sync_wait(Task::new({
            let latch = latch.clone();
            async move { latch.wait().await }
        }));
    }

    #[test]
    fn extra_count_down_calls_are_noop() {
        let latch = Latch::new(1);
        latch.count_down();
        latch.count_down();
        latch.count_down();
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn blocking_wait_unblocks_on_count_down() {
        let latch = Arc::new(Latch::new(1));
        let latch2 = latch.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(15));
            latch2.count_down();
        });
        latch.blocking_wait();
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn wait_for_times_out_without_count_down() {
        let latch = Latch::new(1);
        let status = sync_wait(Task::new(async move {
            latch.wait_for(Duration::from_millis(10)).await
        }));
        assert_eq!(status, Status::Timeout);
    }
}
