//! Cancellable timers and time-aware synchronization primitives for async Rust, built on a
//! pluggable task scheduler.
//!
//! This crate is the coroutine bridge and its synchronization primitives, re-expressed around
//! native `async`/`.await`: a [`Task`] handle with detach/attach semantics, a sharded cancellable
//! timer registry every synchronization primitive composes its waits around, and the resulting
//! [`sync`] primitives (semaphore, mutex, shared mutex, condvar, latch, wait group, stop token,
//! future/promise) plus a bounded async [`container`] family. The crate ships exactly one
//! concrete [`Scheduler`] implementor (a worker-thread pool plus a background timer-wheel
//! thread), but the core only ever talks to the `Scheduler` trait so an embedder can plug in
//! their own.

mod configure;
mod error;
mod scheduler;
mod sleep;
mod task;
mod timer;
mod unique_id;
mod waker_util;

pub mod container;
pub mod sync;

pub use configure::{library_init, GlobalSettings};
pub use error::{CokeError, CokeResult, Status};
pub use scheduler::{Job, Scheduler, Series};
pub use sleep::{
    cancel_sleep_by_id, cancel_sleep_by_id_all, prevent_recursive_stack, sleep, sleep_by_id,
    sleep_by_id_infinite, yield_now, Sleep, YieldNow,
};
pub use task::Task;
pub use unique_id::{get_unique_id, INVALID_UNIQUE_ID};
