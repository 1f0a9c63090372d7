//! `Future<T>`/`Promise<T>`: a single-shot, callback-capable result channel, plus
//! [`create_future`] and [`wait_futures`].
//!
//! Grounded on `coke/future.h`. Named `Future`/`Promise` to match the source directly; `Future`
//! here is a plain struct with its own `wait`/`wait_for`/`get` methods, not an implementor of
//! `std::future::Future` (imported below as `StdFuture` to keep the two distinct).

use std::future::Future as StdFuture;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{CokeError, CokeResult};
use crate::sleep::Sleep;
use crate::sync::latch::Latch;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    NotSet,
    Ready,
    Broken,
    Exception,
}

/// The final state observed by [`Future::wait`]/[`Future::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// A value was stored via `Promise::set_value`.
    Ready,
    /// The promise was dropped without ever being set.
    Broken,
    /// An error was stored via `Promise::set_exception`.
    Exception,
    /// The deadline passed with the promise still unset.
    Timeout,
    /// The scheduler is tearing down.
    Aborted,
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Inner<T> {
    slot: Slot,
    value: Option<T>,
    error: Option<CokeError>,
    waker: Option<Waker>,
    callback: Option<Callback>,
}

struct State<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> State<T> {
    fn new() -> Arc<Self> {
        Arc::new(State {
            inner: Mutex::new(Inner {
                slot: Slot::NotSet,
                value: None,
                error: None,
                waker: None,
                callback: None,
            }),
        })
    }

    fn resolve(&self, slot: Slot, value: Option<T>, error: Option<CokeError>) {
        let (waker, callback) = {
            let mut guard = self.inner.lock();
            if guard.slot != Slot::NotSet {
                return;
            }
            guard.slot = slot;
            guard.value = value;
            guard.error = error;
            (guard.waker.take(), guard.callback.take())
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        if let Some(cb) = callback {
            cb();
        }
    }
}

/// The write side of a [`Future`]. Dropping a `Promise` that never set a value resolves its
/// future as [`FutureStatus::Broken`].
pub struct Promise<T> {
    state: Arc<State<T>>,
    done: bool,
}

impl<T> Promise<T> {
    /// Stores the value, resolving the future. Returns the value back if it was already set.
    pub fn set_value(&mut self, value: T) -> Result<(), T> {
        if self.done {
            return Err(value);
        }
        self.done = true;
        self.state.resolve(Slot::Ready, Some(value), None);
        Ok(())
    }

    /// Stores an error, resolving the future as [`FutureStatus::Exception`].
    pub fn set_exception(&mut self, error: CokeError) -> Result<(), CokeError> {
        if self.done {
            return Err(error);
        }
        self.done = true;
        self.state.resolve(Slot::Exception, None, Some(error));
        Ok(())
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.done {
            log::debug!("Promise dropped without a value; resolving its future as Broken");
            self.state.resolve(Slot::Broken, None, None);
        }
    }
}

/// The read side of a [`Promise`]. Not [`Clone`]: a future is consumed once, via [`get`](Self::get).
pub struct Future<T> {
    state: Arc<State<T>>,
}

/// Creates a connected `(Promise<T>, Future<T>)` pair, analogous to a one-shot channel.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let state = State::new();
    (
        Promise {
            state: state.clone(),
            done: false,
        },
        Future { state },
    )
}

impl<T> Future<T> {
    fn peek(&self) -> Option<FutureStatus> {
        match self.state.inner.lock().slot {
            Slot::NotSet => None,
            Slot::Ready => Some(FutureStatus::Ready),
            Slot::Broken => Some(FutureStatus::Broken),
            Slot::Exception => Some(FutureStatus::Exception),
        }
    }

    /// Waits asynchronously until the promise resolves.
    pub async fn wait(&self) -> FutureStatus {
        WaitState {
            state: self.state.clone(),
        }
        .await
    }

    /// Waits asynchronously up to `timeout`, returning `FutureStatus::Timeout` if it elapses
    /// first.
    pub async fn wait_for(&self, timeout: Duration) -> FutureStatus {
        if let Some(status) = self.peek() {
            return status;
        }
        WaitOrTimeout {
            state: self.state.clone(),
            sleep: crate::sleep::sleep(timeout),
            deadline: Instant::now() + timeout,
        }
        .await
    }

    /// Consumes the resolved value. Legal only once the promise is `Ready` (returns the value)
    /// or `Exception` (returns the stored error); any other state is a [`CokeError`].
    pub fn get(&self) -> CokeResult<T> {
        let mut guard = self.state.inner.lock();
        match guard.slot {
            Slot::Ready => guard.value.take().ok_or(CokeError::AlreadyTaken),
            Slot::Exception => Err(guard.error.take().unwrap_or(CokeError::NoException)),
            Slot::Broken => Err(CokeError::PromiseBroken),
            Slot::NotSet => Err(CokeError::NotReady),
        }
    }

    /// Registers a callback invoked at most once: immediately (inline, on the calling thread) if
    /// the promise has already resolved, otherwise on whichever thread resolves it.
    pub fn set_callback(&self, cb: impl FnOnce() + Send + 'static) {
        let already_done = {
            let mut guard = self.state.inner.lock();
            if guard.slot == Slot::NotSet {
                guard.callback = Some(Box::new(cb));
                false
            } else {
                true
            }
        };
        if already_done {
            cb();
        }
    }

    /// Removes a previously installed callback. Safe to call whether or not it has already
    /// fired.
    pub fn remove_callback(&self) {
        self.state.inner.lock().callback = None;
    }
}

struct WaitState<T> {
    state: Arc<State<T>>,
}

impl<T> StdFuture for WaitState<T> {
    type Output = FutureStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<FutureStatus> {
        let mut guard = self.state.inner.lock();
        match guard.slot {
            Slot::NotSet => {
                guard.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Slot::Ready => Poll::Ready(FutureStatus::Ready),
            Slot::Broken => Poll::Ready(FutureStatus::Broken),
            Slot::Exception => Poll::Ready(FutureStatus::Exception),
        }
    }
}

struct WaitOrTimeout<T> {
    state: Arc<State<T>>,
    sleep: Sleep,
    deadline: Instant,
}

impl<T> StdFuture for WaitOrTimeout<T> {
    type Output = FutureStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<FutureStatus> {
        let this = self.get_mut();

        {
            let mut guard = this.state.inner.lock();
            match guard.slot {
                Slot::NotSet => guard.waker = Some(cx.waker().clone()),
                Slot::Ready => return Poll::Ready(FutureStatus::Ready),
                Slot::Broken => return Poll::Ready(FutureStatus::Broken),
                Slot::Exception => return Poll::Ready(FutureStatus::Exception),
            }
        }

        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(_) => {
                if Instant::now() >= this.deadline {
                    Poll::Ready(FutureStatus::Timeout)
                } else {
                    // Timer granularity fired a touch early; re-check the promise once more.
                    match this.state.inner.lock().slot {
                        Slot::NotSet => Poll::Ready(FutureStatus::Timeout),
                        Slot::Ready => Poll::Ready(FutureStatus::Ready),
                        Slot::Broken => Poll::Ready(FutureStatus::Broken),
                        Slot::Exception => Poll::Ready(FutureStatus::Exception),
                    }
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Detaches `task`, feeding its result into a fresh promise, and returns the paired future
/// immediately.
pub fn create_future<T: Send + 'static>(task: Task<T>) -> Future<T> {
    let (mut promise, future) = channel();
    Task::new(async move {
        let value = task.await;
        let _ = promise.set_value(value);
    })
    .detach();
    future
}

/// Completes once at least `k` of `futures` have resolved (to any of `Ready`/`Broken`/
/// `Exception`). Built from a [`Latch`] callback per future.
pub async fn wait_futures<T: Send + 'static>(futures: &[Future<T>], k: usize) {
    let target = k.min(futures.len());
    let latch = Arc::new(Latch::new(target));

    for f in futures {
        let latch = latch.clone();
        f.set_callback(move || latch.count_down());
    }

    latch.wait().await;

    for f in futures {
        f.remove_callback();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;

    #[test]
    fn get_returns_the_set_value() {
        let (mut promise, future) = channel::<i32>();
        promise.set_value(42).unwrap();
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn get_rethrows_the_set_exception() {
        let (mut promise, future) = channel::<i32>();
        promise.set_exception(CokeError::NegativeWaitGroup).unwrap();
        assert!(matches!(future.get(), Err(CokeError::NegativeWaitGroup)));
    }

    #[test]
    fn dropped_promise_resolves_broken() {
        let (promise, future) = channel::<i32>();
        drop(promise);
        assert!(matches!(future.get(), Err(CokeError::PromiseBroken)));
    }

    #[test]
    fn wait_for_times_out_then_wait_succeeds() {
        let (mut promise, future) = channel::<i32>();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            promise.set_value(42).unwrap();
        });

        let result = sync_wait(Task::new(async move {
            let timed_out = future.wait_for(Duration::from_millis(10)).await;
            assert_eq!(timed_out, FutureStatus::Timeout);
            let ready = future.wait().await;
            assert_eq!(ready, FutureStatus::Ready);
            future.get().unwrap()
        }));

        handle.join().unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn set_callback_fires_once() {
        let (mut promise, future) = channel::<i32>();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        future.set_callback(move || {
            calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        promise.set_value(1).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_callback_is_safe_either_way() {
        let (_promise, future) = channel::<i32>();
        future.remove_callback();
        future.set_callback(|| {});
        future.remove_callback();
    }

    #[test]
    fn wait_futures_completes_after_k_resolve() {
        let pairs: Vec<_> = (0..5).map(|_| channel::<i32>()).collect();
        let (mut promises, futures): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();

        for p in promises.iter_mut().take(2) {
            p.set_value(0).unwrap();
        }

        sync_wait(Task::new(async move {
            wait_futures(&futures, 2).await;
            assert!(futures.iter().filter(|f| f.peek().is_some()).count() >= 2);
        }));
    }
}
