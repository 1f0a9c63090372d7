//! Outcome and error types shared across every primitive in this crate.
//!
//! [`Status`] is returned by value from timed/cancellable operations and is not an error type:
//! `Timeout`, `Closed` and `Canceled` are expected, successfully-returned outcomes. [`CokeError`]
//! is reserved for contract violations (bugs) and system errors, mirroring the separation the
//! underlying engine makes between thrown errors and plain status codes.

use std::fmt;

/// The outcome of a timed or cancellable operation.
///
/// Numeric values match the scheduler ABI's status codes so a `Status` round-trips cleanly
/// through code that still thinks in terms of the original `SUCCESS(0)/TIMEOUT(1)/ABORTED(2)/
/// CLOSED(3)` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// The operation completed normally.
    Success = 0,
    /// The finite deadline elapsed before the operation could complete.
    Timeout = 1,
    /// The scheduler is tearing down; the operation cannot be retried.
    Aborted = 2,
    /// Only returned by container operations: the container is closed.
    Closed = 3,
    /// A sleep was cancelled via `cancel_sleep`. Normally consumed internally by a
    /// synchronization primitive's predicate loop; only reaches user code when sleeping
    /// directly by id.
    Canceled = 4,
}

impl Status {
    /// True for outcomes a synchronization primitive's wait loop should treat as "recheck the
    /// predicate, a notification or spurious wakeup occurred" rather than a terminal result.
    pub fn is_spurious(self) -> bool {
        matches!(self, Status::Success | Status::Canceled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Timeout => "timeout",
            Status::Aborted => "aborted",
            Status::Closed => "closed",
            Status::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Contract violations and system errors.
///
/// These are distinct from [`Status`]: a `Status::Timeout` is a normal return value, while a
/// `CokeError` means the caller (or the system) did something the contract forbids.
#[derive(Debug, thiserror::Error)]
pub enum CokeError {
    /// `WaitGroup::add` would have driven the internal counter below zero.
    #[error("wait group counter would go negative")]
    NegativeWaitGroup,

    /// `Future::get` was called on a future whose value has already been moved out.
    #[error("future value has already been taken")]
    AlreadyTaken,

    /// `Future::get` was called before the associated promise resolved.
    #[error("future is not ready")]
    NotReady,

    /// The exception slot of a `Future`/`Promise` was read but none was ever stored.
    #[error("future has no stored exception")]
    NoException,

    /// The scheduler is shutting down and refused to accept new work.
    #[error("operation aborted during scheduler shutdown")]
    Aborted,

    /// A system-level failure surfaced by the scheduler (mirrors the original's negative
    /// errno-like return values).
    #[error("system error: {0}")]
    System(#[from] std::io::Error),

    /// `library_init` was called after the global settings were already set (either by an
    /// earlier `library_init` call or by an earlier primitive lazily materializing defaults).
    #[error("coke was already initialized")]
    AlreadyInitialized,

    /// `Future::get`/`Future::wait` observed a promise dropped without `set_value`/
    /// `set_exception` ever being called.
    #[error("promise was dropped without setting a value")]
    PromiseBroken,
}

/// Convenience alias used throughout the crate's public API.
pub type CokeResult<T> = Result<T, CokeError>;
