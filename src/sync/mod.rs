//! Time-aware synchronization primitives, all built on the address-keyed timer registry
//! (`crate::timer`).
//!
//! Every primitive in this module follows the same shape: an internal `parking_lot::Mutex`
//! guarding plain state, and a `while !predicate { sleep(self_key, timeout).await }` loop whose
//! wakeup is a `cancel_sleep` call from whichever side makes the predicate true. See
//! `crate::sleep` for the underlying sleep/cancel primitives.

pub mod condvar;
pub mod future;
pub mod helpers;
pub mod latch;
pub mod mutex;
pub mod semaphore;
pub mod shared_mutex;
pub mod stop_token;
pub mod wait_group;

pub use condvar::Condvar;
pub use future::{Future as CokeFuture, Promise};
pub use helpers::{async_wait, go, submit_go, switch_go_thread, sync_wait, sync_wait_all};
pub use latch::Latch;
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use shared_mutex::{RwLock, RwLockGuard, RwLockReadGuard};
pub use stop_token::{FinishGuard, StopToken};
pub use wait_group::WaitGroup;
