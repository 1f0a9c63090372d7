//! `Bounded<T, S>`: the shared push/pop/close/batch machinery behind [`Queue`](super::queue::Queue),
//! [`Stack`](super::stack::Stack) and [`PriorityQueue`](super::priority_queue::PriorityQueue).
//!
//! Grounded on `coke/queue.h`'s `QueueCommon`. [`Deque`](super::deque::Deque) needs independent
//! front/back operations and is implemented separately rather than through [`Storage`].

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::timer::addr_key;

use super::storage::Storage;

/// Why a push was rejected. Carries the value back so the caller can retry or drop it.
#[derive(Debug)]
pub enum PushError<T> {
    /// The container is closed; it will never accept another element.
    Closed(T),
    /// The container was at capacity (only returned by `try_push`/`try_emplace`).
    Full(T),
    /// The finite deadline elapsed first (only returned by `push_for`).
    Timeout(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(v) | PushError::Full(v) | PushError::Timeout(v) => v,
        }
    }
}

/// Why a pop failed to produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing buffered right now (only returned by `try_pop`).
    Empty,
    /// The container is closed and drained.
    Closed,
    /// The finite deadline elapsed first (only returned by `pop_for`).
    Timeout,
    /// The scheduler is tearing down.
    Aborted,
}

struct Inner<T, S> {
    storage: S,
    capacity: usize,
    closed: bool,
    _marker: std::marker::PhantomData<T>,
}

/// Bounded, closeable, async-aware container shared by every storage discipline in this module.
pub struct Bounded<T, S> {
    inner: Mutex<Inner<T, S>>,
}

impl<T: Send + 'static, S: Storage<T>> Bounded<T, S> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "container capacity must be at least 1");
        Bounded {
            inner: Mutex::new(Inner {
                storage: S::default(),
                capacity,
                closed: false,
                _marker: std::marker::PhantomData,
            }),
        }
    }

    fn producer_key(&self) -> u64 {
        addr_key(self, 1)
    }
    fn consumer_key(&self) -> u64 {
        addr_key(self, 2)
    }

    /// Current element count.
    pub fn len(&self) -> usize {
        self.inner.lock().storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Pushes without waiting. Fails if closed or at capacity.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(PushError::Closed(value));
        }
        if guard.storage.len() >= guard.capacity {
            return Err(PushError::Full(value));
        }
        guard.storage.push(value);
        drop(guard);
        cancel_addr(self.consumer_key(), 1);
        Ok(())
    }

    /// Pushes past capacity; never blocks. Fails only if closed.
    pub fn force_push(&self, value: T) -> Result<(), PushError<T>> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(PushError::Closed(value));
        }
        guard.storage.push(value);
        drop(guard);
        cancel_addr(self.consumer_key(), 1);
        Ok(())
    }

    /// Waits indefinitely for room. Fails promptly with `Closed` if the container is (or
    /// becomes) closed.
    pub async fn push(&self, mut value: T) -> Result<(), PushError<T>> {
        loop {
            let mut guard = self.inner.lock();
            if guard.closed {
                return Err(PushError::Closed(value));
            }
            if guard.storage.len() < guard.capacity {
                guard.storage.push(value);
                drop(guard);
                cancel_addr(self.consumer_key(), 1);
                return Ok(());
            }
            match guarded_sleep_addr_infinite(self.producer_key(), false, move || drop(guard)).await {
                Status::Aborted => return Err(PushError::Closed(value)),
                _ => continue,
            }
        }
    }

    /// Like [`push`](Self::push), giving up with `Timeout` once `timeout` elapses.
    pub async fn push_for(&self, timeout: Duration, mut value: T) -> Result<(), PushError<T>> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut guard = self.inner.lock();
            if guard.closed {
                return Err(PushError::Closed(value));
            }
            if guard.storage.len() < guard.capacity {
                guard.storage.push(value);
                drop(guard);
                cancel_addr(self.consumer_key(), 1);
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PushError::Timeout(value));
            }
            match guarded_sleep_addr(self.producer_key(), remaining, false, move || drop(guard)).await {
                Status::Aborted => return Err(PushError::Closed(value)),
                Status::Success => return Err(PushError::Timeout(value)),
                _ => continue,
            }
        }
    }

    /// Pops without waiting. Fails only if nothing is buffered right now, regardless of
    /// `closed`.
    pub fn try_pop(&self) -> Result<T, PopError> {
        let mut guard = self.inner.lock();
        match guard.storage.pop() {
            Some(value) => {
                drop(guard);
                cancel_addr(self.producer_key(), 1);
                Ok(value)
            }
            None => Err(PopError::Empty),
        }
    }

    /// Waits indefinitely for an element. Returns `Closed` once the container is closed and
    /// drained.
    pub async fn pop(&self) -> Result<T, PopError> {
        loop {
            let mut guard = self.inner.lock();
            if let Some(value) = guard.storage.pop() {
                drop(guard);
                cancel_addr(self.producer_key(), 1);
                return Ok(value);
            }
            if guard.closed {
                return Err(PopError::Closed);
            }
            match guarded_sleep_addr_infinite(self.consumer_key(), false, move || drop(guard)).await {
                Status::Aborted => return Err(PopError::Aborted),
                _ => continue,
            }
        }
    }

    /// Like [`pop`](Self::pop), giving up with `Timeout` once `timeout` elapses.
    pub async fn pop_for(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut guard = self.inner.lock();
            if let Some(value) = guard.storage.pop() {
                drop(guard);
                cancel_addr(self.producer_key(), 1);
                return Ok(value);
            }
            if guard.closed {
                return Err(PopError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PopError::Timeout);
            }
            match guarded_sleep_addr(self.consumer_key(), remaining, false, move || drop(guard)).await {
                Status::Aborted => return Err(PopError::Aborted),
                Status::Success => return Err(PopError::Timeout),
                _ => continue,
            }
        }
    }

    /// Pushes as many of `items` as fit, returning whatever didn't (either because the
    /// container filled up or was/became closed partway through).
    pub fn try_push_range<I: IntoIterator<Item = T>>(&self, items: I) -> Vec<T> {
        let mut pushed = 0usize;
        let mut leftover = Vec::new();
        let mut iter = items.into_iter();

        {
            let mut guard = self.inner.lock();
            while let Some(item) = iter.next() {
                if guard.closed || guard.storage.len() >= guard.capacity {
                    leftover.push(item);
                    break;
                }
                guard.storage.push(item);
                pushed += 1;
            }
        }
        leftover.extend(iter);

        if pushed > 0 {
            cancel_addr(self.consumer_key(), pushed);
        }
        leftover
    }

    /// Pops up to `n` buffered elements without waiting.
    pub fn try_pop_n(&self, n: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(n.min(64));
        {
            let mut guard = self.inner.lock();
            for _ in 0..n {
                match guard.storage.pop() {
                    Some(v) => out.push(v),
                    None => break,
                }
            }
        }
        if !out.is_empty() {
            cancel_addr(self.producer_key(), out.len());
        }
        out
    }

    /// Closes the container: subsequent `push`/`try_push` return `Closed`. Already-buffered
    /// elements remain drainable via `pop`/`try_pop`. Wakes every waiting producer and
    /// consumer.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        cancel_addr(self.producer_key(), usize::MAX);
        cancel_addr(self.consumer_key(), usize::MAX);
    }
}
