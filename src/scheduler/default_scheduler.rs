//! The scheduler this crate ships out of the box: three named worker-thread pools plus one
//! background timer-wheel thread.
//!
//! Grounded on `cancelable_timer.cpp`'s single delay-queue thread and the executor's named-queue
//! (`handler`/`compute`/`poller`) model. Cancellation is deliberately a no-op here:
//! [`TimerNode`]'s own `in_map` flag already makes a timer that fires
//! after being logically cancelled harmless, so there is nothing useful for the scheduler itself
//! to do beyond letting the wheel thread eventually pop and drop the node.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::configure::GlobalSettings;
use crate::timer::registry::TimerNode;

use super::{Job, Scheduler, Series};

/// A single named queue of jobs, drained by a small fixed pool of worker threads.
struct Pool {
    queue: Mutex<VecDeque<Job>>,
    cond: Condvar,
}

impl Pool {
    fn spawn(threads: usize, name: &'static str, shutdown: Arc<AtomicBool>) -> Arc<Pool> {
        let pool = Arc::new(Pool {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        });

        for idx in 0..threads.max(1) {
            let pool = pool.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("coke-{name}-{idx}"))
                .spawn(move || Pool::worker_loop(pool, shutdown))
                .expect("failed to spawn coke worker thread");
        }

        pool
    }

    fn worker_loop(pool: Arc<Pool>, shutdown: Arc<AtomicBool>) {
        loop {
            let mut guard = pool.queue.lock();
            while guard.is_empty() && !shutdown.load(Ordering::Acquire) {
                pool.cond.wait(&mut guard);
            }
            let job = guard.pop_front();
            drop(guard);

            match job {
                Some(job) => job(),
                None => {
                    debug_assert!(shutdown.load(Ordering::Acquire));
                    return;
                }
            }
        }
    }

    fn submit(&self, job: Job) {
        let mut guard = self.queue.lock();
        guard.push_back(job);
        drop(guard);
        self.cond.notify_one();
    }

    fn wake_for_shutdown(&self) {
        self.cond.notify_all();
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    node: Arc<TimerNode>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; reverse so the earliest deadline sorts highest.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A single background thread driving a min-heap of pending timers.
struct TimerWheel {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    cond: Condvar,
    seq: AtomicU64,
}

impl TimerWheel {
    fn spawn(shutdown: Arc<AtomicBool>) -> Arc<TimerWheel> {
        let wheel = Arc::new(TimerWheel {
            heap: Mutex::new(BinaryHeap::new()),
            cond: Condvar::new(),
            seq: AtomicU64::new(0),
        });

        let bg = wheel.clone();
        thread::Builder::new()
            .name("coke-timer-wheel".into())
            .spawn(move || TimerWheel::run(bg, shutdown))
            .expect("failed to spawn coke timer wheel thread");

        wheel
    }

    fn submit(&self, duration: Duration, node: Arc<TimerNode>) {
        let deadline = Instant::now() + duration;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.heap.lock();
        let becomes_earliest = guard
            .peek()
            .map(|top| deadline < top.deadline)
            .unwrap_or(true);
        guard.push(TimerEntry { deadline, seq, node });
        drop(guard);

        if becomes_earliest {
            self.cond.notify_one();
        }
    }

    fn run(self: Arc<Self>, shutdown: Arc<AtomicBool>) {
        loop {
            let due = {
                let mut guard = self.heap.lock();
                loop {
                    if shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    match guard.peek() {
                        None => {
                            self.cond.wait(&mut guard);
                        }
                        Some(top) => {
                            let now = Instant::now();
                            if top.deadline <= now {
                                break;
                            }
                            self.cond.wait_for(&mut guard, top.deadline - now);
                        }
                    }
                }
                guard.pop()
            };

            if let Some(entry) = due {
                entry.node.fire();
            }
        }
    }

    fn wake_for_shutdown(&self) {
        self.cond.notify_all();
    }
}

/// The scheduler constructed automatically by [`crate::scheduler::global`] the first time any
/// primitive needs one. Sized from [`GlobalSettings`]; never needs constructing directly unless
/// an embedder wants a private instance (e.g. in a test).
pub struct DefaultScheduler {
    pools: HashMap<&'static str, Arc<Pool>>,
    timers: Arc<TimerWheel>,
    shutdown: Arc<AtomicBool>,
}

impl DefaultScheduler {
    pub fn new(settings: &GlobalSettings) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut pools = HashMap::new();
        pools.insert(
            "handler",
            Pool::spawn(settings.handler_threads, "handler", shutdown.clone()),
        );
        pools.insert(
            "compute",
            Pool::spawn(settings.compute_threads, "compute", shutdown.clone()),
        );
        pools.insert(
            "poller",
            Pool::spawn(settings.poller_threads, "poller", shutdown.clone()),
        );

        DefaultScheduler {
            pools,
            timers: TimerWheel::spawn(shutdown.clone()),
            shutdown,
        }
    }

    fn pool_for(&self, name: Option<&str>) -> &Arc<Pool> {
        name.and_then(|n| self.pools.get(n))
            .unwrap_or_else(|| &self.pools["handler"])
    }

    /// Flags the scheduler as shutting down and wakes every worker/wheel thread so they can
    /// notice and exit. Not part of the `Scheduler` trait: an embedder that wants to tear a
    /// private `DefaultScheduler` down calls this directly.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for pool in self.pools.values() {
            pool.wake_for_shutdown();
        }
        self.timers.wake_for_shutdown();
    }
}

impl Scheduler for DefaultScheduler {
    fn submit_timer(&self, duration: Duration, node: Arc<TimerNode>) {
        self.timers.submit(duration, node);
    }

    fn cancel_timer(&self, _node: &Arc<TimerNode>) {
        // No-op: `TimerNode::in_map` already makes a late fire of a cancelled node harmless, and
        // digging a specific entry back out of the heap isn't worth the extra bookkeeping.
    }

    fn submit_go(&self, pool: Option<&str>, job: Job) {
        self.pool_for(pool).submit(job);
    }

    fn submit_series(&self, series: &Series, job: Job) {
        log::trace!("submit_series on {:?}, routed to the default pool", series.name());
        self.pool_for(None).submit(job);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timer::registry::{self, Family};
    use crate::unique_id::get_unique_id;
    use crate::waker_util::noop_waker;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn submit_go_runs_on_a_worker_thread() {
        let settings = GlobalSettings::default();
        let scheduler = DefaultScheduler::new(&settings);

        let counter = Arc::new(AtomicUsize::new(0));
        let c2 = counter.clone();
        scheduler.submit_go(None, Box::new(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }

    #[test]
    fn submit_timer_fires_after_duration() {
        let settings = GlobalSettings::default();
        let scheduler = DefaultScheduler::new(&settings);

        let key = get_unique_id();
        let node = registry::register_infinite(Family::Uid, key, false, noop_waker());
        scheduler.submit_timer(Duration::from_millis(5), node.clone());

        for _ in 0..200 {
            if node.poll_result().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(node.poll_result(), Some(crate::error::Status::Success));
        scheduler.shutdown();
    }
}
