//! A fair, timed, cancellable counting semaphore.
//!
//! Grounded on `coke/semaphore.h` and `mutex.cpp`'s `acquire_impl` loop: a fresh arrival may take
//! a free permit immediately, but once any waiter is registered, permits are handed out strictly
//! in registration order via the timer registry's FIFO cancellation.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::timer::addr_key;

struct State {
    permits: usize,
    waiters: usize,
}

pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    /// Creates a semaphore starting with `permits` available.
    pub fn new(permits: usize) -> Self {
        Semaphore {
            state: Mutex::new(State { permits, waiters: 0 }),
        }
    }

    fn key(&self) -> u64 {
        addr_key(self, 0)
    }

    /// Takes a permit without waiting. Returns `false` if none is currently available.
    pub fn try_acquire(&self) -> bool {
        let mut guard = self.state.lock();
        if guard.permits > 0 {
            guard.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Waits indefinitely for a permit. Only returns `Status::Aborted` (during scheduler
    /// teardown) or `Status::Success`.
    pub async fn acquire(&self) -> Status {
        let guard = self.state.lock();
        let guard = match self.register_or_take(guard) {
            Ok(status) => return status,
            Err(guard) => guard,
        };
        match guarded_sleep_addr_infinite(self.key(), false, move || drop(guard)).await {
            Status::Aborted => {
                self.leave_waiter();
                Status::Aborted
            }
            // Canceled: `release` already incremented `permits` and chose us, specifically, as
            // one of its `to_wake` targets in FIFO order. Take that earmarked permit directly
            // instead of re-racing every other still-registered waiter for it via the "no
            // waiters" fast-path gate -- that gate is for barging new arrivals, not for a waiter
            // `release` already promised a permit to.
            _ => {
                self.take_earmarked_permit();
                Status::Success
            }
        }
    }

    /// Waits up to `timeout` for a permit. `Status::Success` on acquisition, `Status::Timeout` if
    /// the deadline passed first, `Status::Aborted` on teardown.
    pub async fn acquire_for(&self, timeout: Duration) -> Status {
        let guard = self.state.lock();
        let guard = match self.register_or_take(guard) {
            Ok(status) => return status,
            Err(guard) => guard,
        };
        match guarded_sleep_addr(self.key(), timeout, false, move || drop(guard)).await {
            Status::Aborted => {
                self.leave_waiter();
                Status::Aborted
            }
            // The sleep's own deadline elapsed naturally without a release reaching us.
            Status::Success => {
                self.leave_waiter();
                Status::Timeout
            }
            // Canceled: see the comment in `acquire`.
            _ => {
                self.take_earmarked_permit();
                Status::Success
            }
        }
    }

    /// Releases `k` permits, waking up to `k` of the longest-waiting acquirers.
    pub fn release(&self, k: usize) {
        if k == 0 {
            return;
        }
        let to_wake = {
            let mut guard = self.state.lock();
            guard.permits += k;
            k.min(guard.waiters)
        };
        if to_wake > 0 {
            cancel_addr(self.key(), to_wake);
        }
    }

    /// Takes the fast path if a permit is free and nobody else is already waiting; otherwise
    /// registers as a waiter and hands the still-held guard back so the caller can carry it into
    /// the sleep registration without ever releasing it in between.
    fn register_or_take<'a>(
        &'a self,
        mut guard: MutexGuard<'a, State>,
    ) -> Result<Status, MutexGuard<'a, State>> {
        if guard.waiters == 0 && guard.permits > 0 {
            guard.permits -= 1;
            return Ok(Status::Success);
        }
        guard.waiters += 1;
        Err(guard)
    }

    fn leave_waiter(&self) {
        self.state.lock().waiters -= 1;
    }

    /// Consumes the permit a concurrent `release` call earmarked for this waiter by cancelling
    /// its sleep. `release` always increments `permits` before cancelling, so this never
    /// underflows.
    fn take_earmarked_permit(&self) {
        let mut guard = self.state.lock();
        guard.waiters -= 1;
        guard.permits -= 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use crate::task::Task;
    use std::sync::Arc;

    #[test]
    fn try_acquire_respects_permit_count() {
        let sem = Semaphore::new(1);
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release(1);
        assert!(sem.try_acquire());
    }

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sem2.release(1);
        });
        let status = sync_wait(Task::new(async move { sem.acquire().await }));
        assert_eq!(status, Status::Success);
    }

    #[test]
    fn acquire_for_times_out_with_no_release() {
        let sem = Semaphore::new(0);
        let status = sync_wait(Task::new(async move {
            sem.acquire_for(Duration::from_millis(10)).await
        }));
        assert_eq!(status, Status::Timeout);
    }

    /// Regression test: with a single permit and many contending waiters, every `release(1)`
    /// must free exactly the one waiter it woke, not strand it behind everyone else still
    /// registered. Each worker takes and releases the single permit one thousand times; if a
    /// woken waiter ever failed to consume its earmarked permit (re-queuing instead, because some
    /// *other* waiter was still registered) this would hang instead of completing.
    #[test]
    fn single_permit_contention_makes_forward_progress() {
        let sem = Arc::new(Semaphore::new(1));
        let total = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        const WORKERS: usize = 8;
        const ITERS: usize = 125;

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let sem = sem.clone();
                let total = total.clone();
                let active = active.clone();
                std::thread::spawn(move || {
                    sync_wait(Task::new(async move {
                        for _ in 0..ITERS {
                            let status = sem.acquire().await;
                            assert_eq!(status, Status::Success);
                            let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                            assert_eq!(now, 1, "single-permit semaphore let in a second holder");
                            active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                            total.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            sem.release(1);
                        }
                    }));
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), WORKERS * ITERS);
    }
}
