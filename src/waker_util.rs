//! Executor-agnostic waker plumbing.
//!
//! Kept close to the donor crate's own `DynamicWake`/`to_waker` helpers: a way to turn any
//! `Arc<T: DynamicWake>` into a `std::task::Waker` without an extra heap allocation beyond the
//! `Arc` itself. The timer registry, the future/promise shared state and the default scheduler's
//! task runner all build their wakers this way.

use std::mem;
use std::ptr::null;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Implement this on anything that should be wakeable via a [`Waker`] produced by [`to_waker`].
pub trait DynamicWake {
    /// Perform the waking action.
    fn wake(&self);
}

/// Converts an `Arc<T>` into a [`Waker`].
///
/// Cloning the returned waker clones the underlying `Arc`; dropping the last clone drops the
/// `Arc`. Calling `wake`/`wake_by_ref` invokes [`DynamicWake::wake`].
pub fn to_waker<T: DynamicWake + Send + Sync + 'static>(ptr: Arc<T>) -> Waker {
    let data = Arc::into_raw(ptr) as *const ();
    let vtable = &Helper::<T>::VTABLE;
    unsafe { Waker::from_raw(RawWaker::new(data, vtable)) }
}

/// A waker that does nothing. Useful as a placeholder before a real one is registered.
pub fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(null(), &NOOP_WAKER_VTABLE)) }
}

fn noop_clone(_: *const ()) -> RawWaker {
    RawWaker::new(null(), &NOOP_WAKER_VTABLE)
}
fn noop_dummy(_: *const ()) {}
static NOOP_WAKER_VTABLE: RawWakerVTable =
    RawWakerVTable::new(noop_clone, noop_dummy, noop_dummy, noop_dummy);

struct Helper<T>(T);
impl<T: DynamicWake + Send + Sync + 'static> Helper<T> {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::waker_clone,
        Self::waker_wake,
        Self::waker_wake_by_ref,
        Self::waker_drop,
    );
    unsafe fn waker_clone(ptr: *const ()) -> RawWaker {
        let arc = mem::ManuallyDrop::new(Arc::from_raw(ptr as *const T));
        mem::forget(arc.clone());
        RawWaker::new(ptr, &Self::VTABLE)
    }
    unsafe fn waker_wake(ptr: *const ()) {
        let arc = Arc::from_raw(ptr as *const T);
        arc.wake();
    }
    unsafe fn waker_wake_by_ref(ptr: *const ()) {
        let arc = mem::ManuallyDrop::new(Arc::from_raw(ptr as *const T));
        arc.wake();
    }
    unsafe fn waker_drop(ptr: *const ()) {
        mem::drop(Arc::from_raw(ptr as *const T));
    }
}
