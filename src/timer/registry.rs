//! The cancellable timer registry: the piece every synchronization primitive in this crate is
//! built on top of.
//!
//! Grounded on `cancelable_timer.cpp`'s `CancelInterface`/`CancelableTimerMap`/`TimerList` triad,
//! re-expressed around `Arc` instead of a manual `ref`/`in_map`/`cancel_done` atomic trio: a
//! single `in_map` compare-exchange is sufficient once the node's lifetime is `Arc`-shared
//! between the shard map and the scheduler instead of manually reference-counted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::Status;
use crate::scheduler;

/// Number of independent (mutex + map) shards in each of the two key families.
pub const CANCELABLE_MAP_SIZE: usize = 16;

/// Above this many cancellations in one `cancel` call, wakers are collected and fired after the
/// shard lock is released instead of inline, coalescing the wakeups into a single batch rather
/// than waking the scheduler once per node.
const SYNC_BURST_THRESHOLD: usize = 128;

const PENDING: u8 = 0xFF;

/// Which of the two independent shard families a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// A caller-supplied 64-bit id (`coke::get_unique_id()`-style).
    Uid,
    /// A hashed address of a primitive's own storage (`self as *const _ as usize + N`-style).
    Addr,
}

/// One suspension point registered with the timer registry.
///
/// Shared between whichever shard list it's filed under and (for finite sleeps) the scheduler's
/// timer wheel. Both sides hold a strong `Arc`, so the node outlives whichever side loses the
/// cancel/fire race; only the single `in_map` compare-exchange decides who gets to resolve it.
pub struct TimerNode {
    key: u64,
    family: Family,
    waker: Waker,
    result: AtomicU8,
    in_map: AtomicBool,
}

impl TimerNode {
    fn new(key: u64, family: Family, waker: Waker) -> Arc<Self> {
        Arc::new(TimerNode {
            key,
            family,
            waker,
            result: AtomicU8::new(PENDING),
            in_map: AtomicBool::new(true),
        })
    }

    /// The result if it has been decided, or `None` while still pending.
    pub fn poll_result(&self) -> Option<Status> {
        decode(self.result.load(Ordering::Acquire))
    }

    /// Called by the scheduler's timer wheel when `duration` has elapsed. Finalizes the node as a
    /// natural timeout unless a concurrent `cancel_sleep` already claimed it.
    pub fn fire(self: &Arc<Self>) {
        let shard = shard_for(self.family, self.key);
        let mut guard = shard.lock();

        if self
            .in_map
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            remove_ptr_from_list(&mut guard, self.key, Arc::as_ptr(self));
            self.result.store(encode(Status::Success), Ordering::Release);
            drop(guard);
            self.waker.wake_by_ref();
        }
        // Otherwise a concurrent cancel already removed it and owns the resolution.
    }
}

impl Drop for TimerNode {
    fn drop(&mut self) {
        if self.in_map.load(Ordering::Acquire) {
            let shard = shard_for(self.family, self.key);
            let mut guard = shard.lock();
            if self.in_map.swap(false, Ordering::AcqRel) {
                remove_ptr_from_list(&mut guard, self.key, self as *const TimerNode);
            }
        }
    }
}

fn encode(status: Status) -> u8 {
    match status {
        Status::Success => 0,
        Status::Timeout => 1,
        Status::Aborted => 2,
        Status::Closed => 3,
        Status::Canceled => 4,
    }
}

fn decode(byte: u8) -> Option<Status> {
    match byte {
        0 => Some(Status::Success),
        1 => Some(Status::Timeout),
        2 => Some(Status::Aborted),
        3 => Some(Status::Closed),
        4 => Some(Status::Canceled),
        _ => None,
    }
}

type Shard = Mutex<HashMap<u64, VecDeque<Arc<TimerNode>>>>;

fn new_shards() -> [Shard; CANCELABLE_MAP_SIZE] {
    std::array::from_fn(|_| Mutex::new(HashMap::new()))
}

static UID_SHARDS: Lazy<[Shard; CANCELABLE_MAP_SIZE]> = Lazy::new(new_shards);
static ADDR_SHARDS: Lazy<[Shard; CANCELABLE_MAP_SIZE]> = Lazy::new(new_shards);

fn shard_index(key: u64) -> usize {
    // A cheap multiplicative mix so nearby addresses (the common case for address keys, which
    // differ only by a small offset) land in different shards.
    let mixed = key.wrapping_mul(0x9E3779B97F4A7C15);
    (mixed >> 48) as usize % CANCELABLE_MAP_SIZE
}

fn shard_for(family: Family, key: u64) -> &'static Shard {
    let shards: &'static [Shard; CANCELABLE_MAP_SIZE] = match family {
        Family::Uid => &UID_SHARDS,
        Family::Addr => &ADDR_SHARDS,
    };
    &shards[shard_index(key)]
}

fn remove_ptr_from_list(
    map: &mut HashMap<u64, VecDeque<Arc<TimerNode>>>,
    key: u64,
    node: *const TimerNode,
) {
    if let Some(list) = map.get_mut(&key) {
        if let Some(pos) = list.iter().position(|n| Arc::as_ptr(n) == node) {
            list.remove(pos);
        }
        if list.is_empty() {
            map.remove(&key);
        }
    }
}

/// Registers a finite, cancellable sleep under `key` and hands it to the scheduler's timer wheel.
pub(crate) fn register_finite(
    family: Family,
    key: u64,
    duration: Duration,
    insert_head: bool,
    waker: Waker,
) -> Arc<TimerNode> {
    let node = TimerNode::new(key, family, waker);

    let shard = shard_for(family, key);
    {
        let mut guard = shard.lock();
        let list = guard.entry(key).or_insert_with(VecDeque::new);
        if insert_head {
            list.push_front(node.clone());
        } else {
            list.push_back(node.clone());
        }
    }

    scheduler::global().submit_timer(duration, node.clone());
    node
}

/// Registers an infinite sleep under `key`: never placed on the timer wheel, only ever resolved
/// by `cancel_sleep`.
pub(crate) fn register_infinite(family: Family, key: u64, insert_head: bool, waker: Waker) -> Arc<TimerNode> {
    let node = TimerNode::new(key, family, waker);

    let shard = shard_for(family, key);
    let mut guard = shard.lock();
    let list = guard.entry(key).or_insert_with(VecDeque::new);
    if insert_head {
        list.push_front(node.clone());
    } else {
        list.push_back(node.clone());
    }

    node
}

/// Cancels up to `max` sleeps registered under `key`, oldest-first, returning the number actually
/// cancelled.
pub(crate) fn cancel(family: Family, key: u64, max: usize) -> usize {
    let shard = shard_for(family, key);
    let mut guard = shard.lock();

    let len = guard.get(&key).map(|l| l.len()).unwrap_or(0);
    let take = max.min(len);
    if take == 0 {
        return 0;
    }

    let need_burst = take > SYNC_BURST_THRESHOLD;
    let mut deferred: SmallVec<[Arc<TimerNode>; 8]> = SmallVec::new();

    let mut cancelled = 0;
    for _ in 0..take {
        let node = {
            let list = guard.get_mut(&key).expect("list present for counted entries");
            list.pop_front().expect("counted entries are present")
        };

        // Under the shard lock, any node still in the list cannot have been claimed by `fire`
        // yet (fire's own claim removes the node from the list under this same lock), so this
        // store always wins.
        node.in_map.store(false, Ordering::Release);
        node.result.store(encode(Status::Canceled), Ordering::Release);
        cancelled += 1;

        scheduler::global().cancel_timer(&node);

        if need_burst {
            deferred.push(node);
        } else {
            node.waker.wake_by_ref();
        }
    }

    if guard.get(&key).map(|l| l.is_empty()).unwrap_or(false) {
        guard.remove(&key);
    }

    drop(guard);

    for node in deferred {
        node.waker.wake_by_ref();
    }

    cancelled
}

#[cfg(test)]
mod test {
    use super::*;
    use std::task::Context;

    fn noop() -> Waker {
        crate::waker_util::noop_waker()
    }

    #[test]
    fn cancel_on_empty_key_is_noop() {
        let key = crate::unique_id::get_unique_id();
        assert_eq!(cancel(Family::Uid, key, 5), 0);
    }

    #[test]
    fn infinite_sleep_is_resolved_only_by_cancel() {
        let key = crate::unique_id::get_unique_id();
        let node = register_infinite(Family::Uid, key, false, noop());
        assert!(node.poll_result().is_none());

        let cancelled = cancel(Family::Uid, key, 1);
        assert_eq!(cancelled, 1);
        assert_eq!(node.poll_result(), Some(Status::Canceled));
    }

    #[test]
    fn cancel_respects_fifo_order_and_max() {
        let key = crate::unique_id::get_unique_id();
        let nodes: Vec<_> = (0..10)
            .map(|_| register_infinite(Family::Uid, key, false, noop()))
            .collect();

        let cancelled = cancel(Family::Uid, key, 3);
        assert_eq!(cancelled, 3);

        for n in &nodes[..3] {
            assert_eq!(n.poll_result(), Some(Status::Canceled));
        }
        for n in &nodes[3..] {
            assert!(n.poll_result().is_none());
        }

        let _ = Context::from_waker; // keep import used across cfg combinations
    }
}
