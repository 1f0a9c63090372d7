//! Double-ended async container with independent front/back push and pop.
//!
//! Grounded on `coke/queue.h`'s deque variant. Kept separate from [`Bounded`](super::bounded::Bounded)
//! rather than squeezed through [`Storage`](super::storage::Storage), since `Storage` models a
//! single-ended discipline and a deque genuinely needs four distinct operations.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Status;
use crate::sleep::{cancel_addr, guarded_sleep_addr, guarded_sleep_addr_infinite};
use crate::timer::addr_key;

use super::bounded::{PopError, PushError};

struct Inner<T> {
    storage: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A bounded, closeable, async double-ended queue.
pub struct Deque<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Send + 'static> Deque<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "container capacity must be at least 1");
        Deque {
            inner: Mutex::new(Inner {
                storage: VecDeque::new(),
                capacity,
                closed: false,
            }),
        }
    }

    fn producer_key(&self) -> u64 {
        addr_key(self, 1)
    }
    fn consumer_key(&self) -> u64 {
        addr_key(self, 2)
    }

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

    pub fn try_push_back(&self, value: T) -> Result<(), PushError<T>> {
        self.try_push(value, true)
    }

    pub fn try_push_front(&self, value: T) -> Result<(), PushError<T>> {
        self.try_push(value, false)
    }

    fn try_push(&self, value: T, back: bool) -> Result<(), PushError<T>> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(PushError::Closed(value));
        }
        if guard.storage.len() >= guard.capacity {
            return Err(PushError::Full(value));
        }
        if back {
            guard.storage.push_back(value);
        } else {
            guard.storage.push_front(value);
        }
        drop(guard);
        cancel_addr(self.consumer_key(), 1);
        Ok(())
    }

    pub async fn push_back(&self, value: T) -> Result<(), PushError<T>> {
        self.push(value, true).await
    }

    pub async fn push_front(&self, value: T) -> Result<(), PushError<T>> {
        self.push(value, false).await
    }

    async fn push(&self, mut value: T, back: bool) -> Result<(), PushError<T>> {
        loop {
            let mut guard = self.inner.lock();
            if guard.closed {
                return Err(PushError::Closed(value));
            }
            if guard.storage.len() < guard.capacity {
                if back {
                    guard.storage.push_back(value);
                } else {
                    guard.storage.push_front(value);
                }
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

    pub fn try_pop_front(&self) -> Result<T, PopError> {
        self.try_pop(true)
    }

    pub fn try_pop_back(&self) -> Result<T, PopError> {
        self.try_pop(false)
    }

    fn try_pop(&self, front: bool) -> Result<T, PopError> {
        let mut guard = self.inner.lock();
        let value = if front {
            guard.storage.pop_front()
        } else {
            guard.storage.pop_back()
        };
        match value {
            Some(value) => {
                drop(guard);
                cancel_addr(self.producer_key(), 1);
                Ok(value)
            }
            None => Err(PopError::Empty),
        }
    }

    pub async fn pop_front(&self) -> Result<T, PopError> {
        self.pop(true).await
    }

    pub async fn pop_back(&self) -> Result<T, PopError> {
        self.pop(false).await
    }

    async fn pop(&self, front: bool) -> Result<T, PopError> {
        loop {
            let mut guard = self.inner.lock();
            let value = if front {
                guard.storage.pop_front()
            } else {
                guard.storage.pop_back()
            };
            if let Some(value) = value {
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

    /// Like [`pop_front`](Self::pop_front), giving up with `Timeout` once `timeout` elapses.
    pub async fn pop_front_for(&self, timeout: Duration) -> Result<T, PopError> {
        self.pop_for(true, timeout).await
    }

    pub async fn pop_back_for(&self, timeout: Duration) -> Result<T, PopError> {
        self.pop_for(false, timeout).await
    }

    async fn pop_for(&self, front: bool, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut guard = self.inner.lock();
            let value = if front {
                guard.storage.pop_front()
            } else {
                guard.storage.pop_back()
            };
            if let Some(value) = value {
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

    /// Closes the deque: subsequent pushes fail; buffered elements remain poppable from either
    /// end.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        cancel_addr(self.producer_key(), usize::MAX);
        cancel_addr(self.consumer_key(), usize::MAX);
    }
}
