//! Glue helpers that bridge the task/future world and a plain calling OS thread, plus thin
//! wrappers over the scheduler's worker-pool surface.
//!
//! Grounded on `coke/make_task.h`.

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use crate::scheduler;
use crate::sync::latch::Latch;
use crate::task::Task;

/// Blocks the calling OS thread until `task` completes, returning its value. The caller need not
/// be running inside any executor -- `Latch::blocking_wait` parks on a plain
/// `std::sync::Condvar`, not a coke sleep.
pub fn sync_wait<T: Send + 'static>(task: Task<T>) -> T {
    let latch = Arc::new(Latch::new(1));
    let slot: Arc<StdMutex<Option<T>>> = Arc::new(StdMutex::new(None));

    let latch2 = latch.clone();
    let slot2 = slot.clone();
    Task::new(async move {
        let value = task.await;
        *slot2.lock().unwrap() = Some(value);
        latch2.count_down();
    })
    .detach();

    latch.blocking_wait();
    slot.lock()
        .unwrap()
        .take()
        .expect("sync_wait's detached task completed without storing a value")
}

/// Blocks the calling OS thread until every task in `tasks` completes, returning their results
/// in the same order.
pub fn sync_wait_all<T: Send + 'static>(tasks: Vec<Task<T>>) -> Vec<T> {
    sync_wait(async_wait(tasks))
}

/// Polls every task in `tasks` concurrently, returning a `Task` that resolves once all of them
/// have, preserving input order.
pub fn async_wait<T: Send + 'static>(tasks: Vec<Task<T>>) -> Task<Vec<T>> {
    let len = tasks.len();
    Task::new(JoinAll {
        tasks: tasks.into_iter().map(Some).collect(),
        results: (0..len).map(|_| None).collect(),
    })
}

struct JoinAll<T> {
    tasks: Vec<Option<Task<T>>>,
    results: Vec<Option<T>>,
}

impl<T> StdFuture for JoinAll<T> {
    type Output = Vec<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Vec<T>> {
        let this = self.get_mut();
        let mut all_done = true;

        for i in 0..this.tasks.len() {
            if let Some(task) = &mut this.tasks[i] {
                match Pin::new(task).poll(cx) {
                    Poll::Ready(value) => {
                        this.results[i] = Some(value);
                        this.tasks[i] = None;
                    }
                    Poll::Pending => all_done = false,
                }
            }
        }

        if all_done {
            Poll::Ready(this.results.iter_mut().map(|r| r.take().unwrap()).collect())
        } else {
            Poll::Pending
        }
    }
}

/// `f` must return a `Task<T>` (typically an `async move { ... }` block). `make_task` exists so
/// that owned state `f` captured can outlive the call expression that produced the task -- in
/// this port that's simply `f()`, since the returned `Task` already owns everything it needs.
pub fn make_task<T, F>(f: F) -> Task<T>
where
    T: Send + 'static,
    F: FnOnce() -> Task<T>,
{
    f()
}

/// Submits a synchronous job to the scheduler's worker pool. `pool` selects a named sub-pool
/// (`"compute"`, `"poller"`, ...); an unknown or absent name falls back to the default pool.
pub fn go(pool: Option<&str>, job: impl FnOnce() + Send + 'static) {
    scheduler::global().submit_go(pool, Box::new(job));
}

/// Alias for [`go`], named after the scheduler ABI method it routes through.
pub fn submit_go(pool: Option<&str>, job: impl FnOnce() + Send + 'static) {
    go(pool, job)
}

/// An awaitable that suspends the current task and resumes it on the named worker pool, without
/// leaving the async model.
#[must_use = "switch_go_thread does nothing unless awaited"]
pub fn switch_go_thread(pool: Option<&'static str>) -> SwitchGoThread {
    SwitchGoThread {
        pool,
        submitted: false,
    }
}

pub struct SwitchGoThread {
    pool: Option<&'static str>,
    submitted: bool,
}

impl StdFuture for SwitchGoThread {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.submitted {
            return Poll::Ready(());
        }
        this.submitted = true;
        let waker = cx.waker().clone();
        scheduler::global().submit_go(this.pool, Box::new(move || waker.wake()));
        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sync_wait_returns_the_tasks_value() {
        let value = sync_wait(Task::new(async { 1 + 1 }));
        assert_eq!(value, 2);
    }

    #[test]
    fn sync_wait_all_preserves_order() {
        let tasks = (0..8).map(|i| Task::new(async move { i * i })).collect();
        let results = sync_wait_all(tasks);
        assert_eq!(results, (0..8).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn go_runs_the_job() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        go(None, move || done2.store(true, Ordering::SeqCst));
        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn switch_go_thread_resumes_the_task() {
        let value = sync_wait(Task::new(async {
            switch_go_thread(None).await;
            99
        }));
        assert_eq!(value, 99);
    }

    #[test]
    fn make_task_is_a_thin_passthrough() {
        let value = sync_wait(make_task(|| Task::new(async { 7 })));
        assert_eq!(value, 7);
    }
}
