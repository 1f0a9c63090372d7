//! Public sleep primitives built directly on the timer registry: `sleep`, `sleep_by_id`,
//! `cancel_sleep_by_id`, `yield_now`, and the `prevent_recursive_stack` helper for chain-style
//! loops. Address-keyed variants used internally by the synchronization primitives live here too
//! but are not re-exported from the crate root.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::Status;
use crate::scheduler;
use crate::timer::registry::{self, Family, TimerNode};
use crate::unique_id::get_unique_id;

enum SleepParams {
    /// Fire-and-forget, not addressable by any key a user could guess.
    Plain(Duration),
    Keyed {
        family: Family,
        key: u64,
        duration: Option<Duration>,
        insert_head: bool,
    },
}

/// The future returned by every flavor of `sleep`. Must be awaited (or dropped) promptly;
/// dropping it before it resolves removes its registration from the timer registry (see
/// [`TimerNode`]'s `Drop` impl).
#[must_use = "sleep futures do nothing unless awaited"]
pub struct Sleep {
    params: Option<SleepParams>,
    node: Option<Arc<TimerNode>>,
}

impl Future for Sleep {
    type Output = Status;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Status> {
        let this = self.get_mut();

        if let Some(node) = &this.node {
            return match node.poll_result() {
                Some(status) => Poll::Ready(status),
                None => Poll::Pending,
            };
        }

        let params = this
            .params
            .take()
            .expect("Sleep future polled again after already resolving");

        if scheduler::global().is_shutting_down() {
            return Poll::Ready(Status::Aborted);
        }

        let waker = cx.waker().clone();
        let node = match params {
            SleepParams::Plain(duration) => {
                registry::register_finite(Family::Uid, get_unique_id(), duration, false, waker)
            }
            SleepParams::Keyed {
                family,
                key,
                duration: Some(duration),
                insert_head,
            } => registry::register_finite(family, key, duration, insert_head, waker),
            SleepParams::Keyed {
                family,
                key,
                duration: None,
                insert_head,
            } => registry::register_infinite(family, key, insert_head, waker),
        };

        this.node = Some(node);
        Poll::Pending
    }
}

/// Fire-and-forget, non-cancellable sleep. Resolves `Status::Success` unless the scheduler is
/// tearing down (`Status::Aborted`).
#[must_use]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        params: Some(SleepParams::Plain(duration)),
        node: None,
    }
}

/// Cancellable sleep registered under a caller-supplied id. `insert_head` places the sleep at the
/// front of `id`'s FIFO queue so it is cancelled before sleeps registered after it with
/// `insert_head = false`.
#[must_use]
pub fn sleep_by_id(id: u64, duration: Duration, insert_head: bool) -> Sleep {
    Sleep {
        params: Some(SleepParams::Keyed {
            family: Family::Uid,
            key: id,
            duration: Some(duration),
            insert_head,
        }),
        node: None,
    }
}

/// Like [`sleep_by_id`], but never fires on its own; only [`cancel_sleep_by_id`] wakes it.
#[must_use]
pub fn sleep_by_id_infinite(id: u64, insert_head: bool) -> Sleep {
    Sleep {
        params: Some(SleepParams::Keyed {
            family: Family::Uid,
            key: id,
            duration: None,
            insert_head,
        }),
        node: None,
    }
}

/// Cancels up to `max` sleeps registered under `id`, oldest-first. Returns the number actually
/// cancelled (0 if nothing was registered under `id`).
pub fn cancel_sleep_by_id(id: u64, max: usize) -> usize {
    registry::cancel(Family::Uid, id, max)
}

/// Cancels every sleep registered under `id`.
pub fn cancel_sleep_by_id_all(id: u64) -> usize {
    registry::cancel(Family::Uid, id, usize::MAX)
}

pub(crate) fn sleep_addr(key: u64, duration: Duration, insert_head: bool) -> Sleep {
    Sleep {
        params: Some(SleepParams::Keyed {
            family: Family::Addr,
            key,
            duration: Some(duration),
            insert_head,
        }),
        node: None,
    }
}

pub(crate) fn sleep_addr_infinite(key: u64, insert_head: bool) -> Sleep {
    Sleep {
        params: Some(SleepParams::Keyed {
            family: Family::Addr,
            key,
            duration: None,
            insert_head,
        }),
        node: None,
    }
}

pub(crate) fn cancel_addr(key: u64, max: usize) -> usize {
    registry::cancel(Family::Addr, key, max)
}

/// Like [`Sleep`], but registers itself with the timer registry on its first poll and only then
/// runs `after_register` -- once, exactly at the point the wait becomes visible to a concurrent
/// `cancel_addr`.
///
/// Every synchronization primitive in this crate holds an internal lock while it decides it
/// needs to wait. If that lock were released before the wait is registered, a release/notify
/// racing in that gap would find nothing to cancel and the waiter would then register and sleep
/// past a wakeup that already happened. Passing the still-held guard in as `after_register`
/// (typically `move || drop(guard)`) keeps the lock held across registration, so any concurrent
/// release/notify either completes before the guard is taken (and this call's predicate check
/// already accounted for it) or blocks on the same lock until after the node exists.
#[must_use = "sleep futures do nothing unless awaited"]
pub(crate) struct GuardedSleep<F: FnOnce()> {
    key: u64,
    duration: Option<Duration>,
    insert_head: bool,
    after_register: Option<F>,
    node: Option<Arc<TimerNode>>,
}

pub(crate) fn guarded_sleep_addr<F: FnOnce()>(
    key: u64,
    duration: Duration,
    insert_head: bool,
    after_register: F,
) -> GuardedSleep<F> {
    GuardedSleep {
        key,
        duration: Some(duration),
        insert_head,
        after_register: Some(after_register),
        node: None,
    }
}

pub(crate) fn guarded_sleep_addr_infinite<F: FnOnce()>(
    key: u64,
    insert_head: bool,
    after_register: F,
) -> GuardedSleep<F> {
    GuardedSleep {
        key,
        duration: None,
        insert_head,
        after_register: Some(after_register),
        node: None,
    }
}

impl<F: FnOnce()> Future for GuardedSleep<F> {
    type Output = Status;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Status> {
        let this = self.get_mut();

        if let Some(node) = &this.node {
            return match node.poll_result() {
                Some(status) => Poll::Ready(status),
                None => Poll::Pending,
            };
        }

        if scheduler::global().is_shutting_down() {
            if let Some(run) = this.after_register.take() {
                run();
            }
            return Poll::Ready(Status::Aborted);
        }

        let waker = cx.waker().clone();
        let node = match this.duration {
            Some(duration) => registry::register_finite(Family::Addr, this.key, duration, this.insert_head, waker),
            None => registry::register_infinite(Family::Addr, this.key, this.insert_head, waker),
        };
        this.node = Some(node);

        if let Some(run) = this.after_register.take() {
            run();
        }

        Poll::Pending
    }
}

/// A zero-duration sleep that always transitions the task to a fresh poll on a scheduler thread.
///
/// Routed through `submit_go` rather than the timer wheel: it is a pure reschedule, not a timed
/// wait, so there is no reason to pay timer-wheel granularity for it.
#[must_use = "yield_now does nothing unless awaited"]
pub fn yield_now() -> YieldNow {
    YieldNow { submitted: false }
}

pub struct YieldNow {
    submitted: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.submitted {
            return Poll::Ready(());
        }
        this.submitted = true;
        let waker = cx.waker().clone();
        scheduler::global().submit_go(None, Box::new(move || waker.wake()));
        Poll::Pending
    }
}

thread_local! {
    static RECURSION_DEPTH: Cell<u32> = Cell::new(0);
}

/// Chain-style synchronous loops (e.g. a recursive combinator awaiting an already-ready future on
/// every iteration) can blow the stack if they never actually suspend. Call this once per
/// iteration; once a per-thread counter crosses a threshold it forces a real `yield_now().await`
/// and resets the counter.
pub async fn prevent_recursive_stack() {
    const MAX_RECURSION: u32 = 256;

    let should_yield = RECURSION_DEPTH.with(|depth| {
        let next = depth.get() + 1;
        depth.set(next);
        next >= MAX_RECURSION
    });

    if should_yield {
        RECURSION_DEPTH.with(|depth| depth.set(0));
        yield_now().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use std::time::Duration;

    #[test]
    fn plain_sleep_resolves_success() {
        let status = sync_wait(crate::task::Task::new(async { sleep(Duration::from_millis(1)).await }));
        assert_eq!(status, Status::Success);
    }

    #[test]
    fn cancel_by_id_with_nothing_registered_is_noop() {
        let id = get_unique_id();
        assert_eq!(cancel_sleep_by_id(id, 3), 0);
    }
}
