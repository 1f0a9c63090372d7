//! Bounded, closeable, async-aware container family: [`Queue`], [`Stack`], [`PriorityQueue`] and
//! [`Deque`].
//!
//! Grounded on `coke/queue.h`'s `QueueCommon` CRTP hierarchy, re-expressed as a generic
//! [`bounded::Bounded`] struct parameterized over a [`storage::Storage`] backing store, plus a
//! standalone [`Deque`] for the operations a single-ended `Storage` can't express.

mod bounded;
mod deque;
mod priority_queue;
mod queue;
mod stack;
mod storage;

pub use bounded::{Bounded, PopError, PushError};
pub use deque::Deque;
pub use priority_queue::PriorityQueue;
pub use queue::Queue;
pub use stack::Stack;
pub use storage::Storage;
