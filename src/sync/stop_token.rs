//! Cooperative cancellation signal plus a finish-counter rendezvous.
//!
//! Grounded on `coke/stop_token.h`/`stop_token.cpp`: two independent address keys on the same
//! object (`self+1` for the stop signal, `self+2` for the finish countdown), so a task can be told
//! to stop and separately have its peers wait for it to actually wind down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Status;
use crate::sleep::{cancel_addr, sleep_addr, sleep_addr_infinite};
use crate::timer::addr_key;

pub struct StopToken {
    should_stop: AtomicBool,
    finish_count: Mutex<usize>,
}

impl StopToken {
    /// Creates a token that `finish_count` tasks are expected to call [`set_finished`](Self::set_finished)
    /// on before `wait_finish` releases.
    pub fn new(finish_count: usize) -> Self {
        StopToken {
            should_stop: AtomicBool::new(false),
            finish_count: Mutex::new(finish_count),
        }
    }

    fn stop_key(&self) -> u64 {
        addr_key(self, 1)
    }
    fn finish_key(&self) -> u64 {
        addr_key(self, 2)
    }

    /// Requests that listeners stop. Idempotent.
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Release);
        cancel_addr(self.stop_key(), usize::MAX);
    }

    /// True once [`request_stop`](Self::request_stop) has been called.
    pub fn is_stopping(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    /// Waits asynchronously until stop has been requested.
    pub async fn wait_stop(&self) {
        while !self.is_stopping() {
            let _ = sleep_addr_infinite(self.stop_key(), false).await;
        }
    }

    /// Waits asynchronously up to `timeout` for stop to be requested. Returns immediately,
    /// without sleeping, if stop has already been requested.
    pub async fn wait_stop_for(&self, timeout: Duration) -> bool {
        if self.is_stopping() {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.is_stopping() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match sleep_addr(self.stop_key(), remaining, false).await {
                Status::Success if self.is_stopping() => return true,
                Status::Success => return false,
                _ => continue,
            }
        }
    }

    /// Counts one listener down as finished, waking `wait_finish`/`wait_finish_for` once the
    /// count reaches zero.
    pub fn set_finished(&self) {
        let reached_zero = {
            let mut guard = self.finish_count.lock();
            if *guard == 0 {
                return;
            }
            *guard -= 1;
            *guard == 0
        };
        if reached_zero {
            cancel_addr(self.finish_key(), usize::MAX);
        }
    }

    /// A scoped helper that calls [`set_finished`](Self::set_finished) on every exit path,
    /// including unwinding.
    pub fn finish_guard(&self) -> FinishGuard<'_> {
        FinishGuard { token: self }
    }

    /// Waits asynchronously until every listener has called `set_finished`.
    pub async fn wait_finish(&self) {
        while *self.finish_count.lock() > 0 {
            let _ = sleep_addr_infinite(self.finish_key(), false).await;
        }
    }

    /// Waits asynchronously up to `timeout`.
    pub async fn wait_finish_for(&self, timeout: Duration) -> Status {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if *self.finish_count.lock() == 0 {
                return Status::Success;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Status::Timeout;
            }
            match sleep_addr(self.finish_key(), remaining, false).await {
                Status::Aborted => return Status::Aborted,
                Status::Success if *self.finish_count.lock() == 0 => return Status::Success,
                Status::Success => return Status::Timeout,
                _ => continue,
            }
        }
    }
}

/// Calls [`StopToken::set_finished`] when dropped, including on panic/unwind.
pub struct FinishGuard<'a> {
    token: &'a StopToken,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.token.set_finished();
    }
}
