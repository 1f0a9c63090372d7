//! `Task<T>`: a boxed, not-yet-driven asynchronous computation, plus the detached-task runner
//! that drives one to completion on the scheduler without any awaiter.
//!
//! Native `async`/`.await` already gives us the compiler-generated state machine that the
//! original engine hand-rolled as a coroutine promise; `Task<T>` is deliberately thin -- just
//! enough to let `detach()`/`detach_on_series()`/`set_context()` attach the extra bookkeeping the
//! original promise type carried.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;

use crate::scheduler::{self, Job, Series};
use crate::waker_util::{to_waker, DynamicWake};

/// A not-yet-run or in-progress asynchronous computation producing `T`.
///
/// Building a `Task` does not start it; only `.await`-ing it, calling [`Task::detach`], or
/// handing it to `sync_wait`/`async_wait` does. `T` must be `Send + 'static` since the task may
/// end up driven on any scheduler worker thread.
#[must_use = "a Task does nothing until awaited, detached, or passed to sync_wait/async_wait"]
pub struct Task<T> {
    future: Pin<Box<dyn Future<Output = T> + Send>>,
    context: Option<Box<dyn Any + Send>>,
    series: Option<Series>,
}

impl<T: Send + 'static> Task<T> {
    /// Wraps an existing future as a `Task`.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Task {
            future: Box::pin(future),
            context: None,
            series: None,
        }
    }

    /// Attaches an arbitrary owning object whose lifetime is tied to this task. Used when the
    /// future borrows from state that would otherwise be dropped at the end of the expression
    /// that constructed it.
    pub fn set_context<C: Any + Send + 'static>(mut self, obj: C) -> Self {
        self.context = Some(Box::new(obj));
        self
    }

    /// Attaches this task to a caller-supplied [`Series`] so that any `go`/`submit_go` calls
    /// issued from inside its body (once detached) are grouped under it.
    pub fn detach_on_series(mut self, series: Series) -> Self {
        self.series = Some(series);
        self
    }

    /// Consumes the task, submitting its future to the scheduler to run to completion with no
    /// awaiter. The return value is discarded. A panic inside the body is caught here (there is
    /// no caller left to unwind into) and logged, rather than taking down a worker thread.
    pub fn detach(self) {
        let Task {
            future,
            context,
            series,
        } = self;

        let body = async move {
            let _context = context;
            match CatchUnwind { inner: future }.await {
                Ok(_) => log::trace!("detached task completed"),
                Err(payload) => {
                    log::error!("detached task panicked: {}", panic_message(&payload))
                }
            }
        };

        Runnable::spawn(Box::pin(body), series);
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

struct CatchUnwind<T> {
    inner: Pin<Box<dyn Future<Output = T> + Send>>,
}

impl<T> Future for CatchUnwind<T> {
    type Output = std::thread::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let inner = &mut this.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Ready(v)) => Poll::Ready(Ok(v)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

/// Drives one boxed `()`-future to completion by repeatedly re-submitting itself to the
/// scheduler's go-pool (or series) whenever its waker fires. This is the executor half of
/// `detach()`: a minimal, scheduler-agnostic "spawn" built only out of `submit_go`/
/// `submit_series`, so any `Scheduler` implementor -- not just `DefaultScheduler` -- can drive
/// detached tasks.
struct Runnable {
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    series: Option<Series>,
    self_weak: Weak<Runnable>,
}

impl Runnable {
    fn spawn(future: Pin<Box<dyn Future<Output = ()> + Send>>, series: Option<Series>) {
        let runnable = Arc::new_cyclic(|weak| Runnable {
            future: Mutex::new(Some(future)),
            series,
            self_weak: weak.clone(),
        });
        Runnable::poll_once(&runnable);
    }

    fn poll_once(this: &Arc<Runnable>) {
        let mut guard = this.future.lock();
        if let Some(fut) = guard.as_mut() {
            let waker = to_waker(this.clone());
            let mut cx = Context::from_waker(&waker);
            if let Poll::Ready(()) = fut.as_mut().poll(&mut cx) {
                *guard = None;
            }
        }
    }
}

impl DynamicWake for Runnable {
    fn wake(&self) {
        if let Some(strong) = self.self_weak.upgrade() {
            let series = strong.series.clone();
            let job: Job = Box::new(move || Runnable::poll_once(&strong));
            match series {
                Some(s) => scheduler::global().submit_series(&s, job),
                None => scheduler::global().submit_go(None, job),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn detach_runs_to_completion() {
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        Task::new(async move {
            done2.store(true, Ordering::SeqCst);
        })
        .detach();

        // Give the scheduler a moment to run the detached job.
        for _ in 0..200 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn awaiting_a_task_returns_its_value() {
        let value = sync_wait(Task::new(async { 41 + 1 }));
        assert_eq!(value, 42);
    }

    #[test]
    fn set_context_keeps_captured_state_alive() {
        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = Guard(dropped.clone());

        let value = sync_wait(Task::new(async { 7 }).set_context(guard));
        assert_eq!(value, 7);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
