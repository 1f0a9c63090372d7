//! An owning, async-aware mutex built directly on a one-permit [`Semaphore`].
//!
//! `coke/mutex.cpp`'s `Mutex` only ever guards the caller's own critical section, never the
//! value protected by it; idiomatic Rust mutexes always own their data, so `Mutex<T>` wraps the
//! value directly the way `std::sync::Mutex<T>` does. The "assigning into a held lock releases it
//! first" rule the source documents has no analogue here and is dropped.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::Status;

use super::semaphore::Semaphore;

pub struct Mutex<T: ?Sized> {
    sem: Semaphore,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Mutex {
            sem: Semaphore::new(1),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Takes the lock without waiting. `None` if it is currently held.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.sem.try_acquire() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Waits indefinitely for the lock. Locking a mutex already held by the same logical task is
    /// a deadlock hazard, undetectable without thread-local task identity, exactly as
    /// `std::sync::Mutex` itself behaves.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        loop {
            match self.sem.acquire().await {
                Status::Success => return MutexGuard { mutex: self },
                _ => {
                    log::warn!("Mutex::lock observed scheduler teardown; parking until exit");
                    crate::sleep::yield_now().await;
                }
            }
        }
    }

    /// Waits up to `timeout` for the lock.
    pub async fn lock_for(&self, timeout: Duration) -> Result<MutexGuard<'_, T>, Status> {
        match self.sem.acquire_for(timeout).await {
            Status::Success => Ok(MutexGuard { mutex: self }),
            other => Err(other),
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

/// RAII guard releasing the lock on drop. Derefs to `T`.
#[must_use = "the lock is released immediately if the guard is not held"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(crate) fn source(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.sem.release(1);
    }
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}
