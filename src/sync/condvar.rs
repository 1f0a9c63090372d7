//! A condition variable compatible with this crate's own [`Mutex`](super::mutex::Mutex).
//!
//! No single `original_source` file covers this shape directly -- the source expresses the same
//! "sleep until predicate, woken by a cancel" pattern inline inside `mutex.cpp` and
//! `shared_mutex.h`; `Condvar` is the generic form of that pattern, keyed by its own address.

use std::time::{Duration, Instant};

use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::sync::mutex::MutexGuard;
use crate::timer::addr_key;

pub struct Condvar;

impl Condvar {
    pub fn new() -> Self {
        Condvar
    }

    fn key(&self) -> u64 {
        addr_key(self, 0)
    }

    /// Waits while `condition` holds, releasing `guard` around every suspension and
    /// re-acquiring it before re-checking. `Success`/`Canceled` sleep outcomes are spurious
    /// wakeups and are silently consumed.
    pub async fn wait_while<'a, T, F>(&self, mut guard: MutexGuard<'a, T>, mut condition: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            let mutex = guard.source();
            let _ = guarded_sleep_addr_infinite(self.key(), false, move || drop(guard)).await;
            guard = mutex.lock().await;
        }
        guard
    }

    /// Like [`wait_while`](Self::wait_while), but gives up once `timeout` elapses with
    /// `condition` still true, returning `Status::Timeout`.
    pub async fn wait_timeout_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        timeout: Duration,
        mut condition: F,
    ) -> (MutexGuard<'a, T>, Status)
    where
        F: FnMut(&mut T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if !condition(&mut *guard) {
                return (guard, Status::Success);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (guard, Status::Timeout);
            }
            let mutex = guard.source();
            let status = guarded_sleep_addr(self.key(), remaining, false, move || drop(guard)).await;
            guard = mutex.lock().await;
            if let Status::Aborted = status {
                return (guard, Status::Aborted);
            }
            // Success (our own deadline) or Canceled (a notify) both fall through to re-check
            // `condition` at the top of the loop.
        }
    }

    /// Wakes exactly one waiter, the oldest registered.
    pub fn notify_one(&self) {
        cancel_addr(self.key(), 1);
    }

    /// Wakes every currently registered waiter.
    pub fn notify_all(&self) {
        cancel_addr(self.key(), usize::MAX);
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Condvar::new()
    }
}
