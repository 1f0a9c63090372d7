//! The external collaborator this crate is built against: an engine that can submit/cancel
//! timers, run callables on worker threads, and append work to a named series.
//!
//! The core (timer registry, sync primitives, container) only ever talks to a `dyn Scheduler`.
//! [`DefaultScheduler`] is the one concrete implementor this crate ships so the whole thing is
//! self-contained and testable without an external networking engine plugged in.

mod default_scheduler;

pub use default_scheduler::DefaultScheduler;

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::timer::registry::TimerNode;

/// A job handed to `submit_go`/`submit_series`: a plain synchronous callable run on a worker
/// thread to completion.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle representing a sequential chain of sub-jobs associated with a detached task.
///
/// `Series` carries no behavior of its own: it exists purely so `detach_on_series`-produced tasks
/// can thread a stable token through to `go`/`submit_go` calls issued from inside their body, the
/// same way the original engine's `SeriesWork` is threaded through nested awaiters.
#[derive(Clone)]
pub struct Series {
    inner: Arc<SeriesState>,
}

struct SeriesState {
    name: Option<String>,
}

impl Series {
    /// Creates a fresh, unnamed series.
    pub fn new() -> Self {
        Series {
            inner: Arc::new(SeriesState { name: None }),
        }
    }

    /// Creates a fresh series carrying a debug-only name.
    pub fn named(name: impl Into<String>) -> Self {
        Series {
            inner: Arc::new(SeriesState {
                name: Some(name.into()),
            }),
        }
    }

    /// The series' debug name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }
}

impl Default for Series {
    fn default() -> Self {
        Self::new()
    }
}

/// The scheduler ABI the core is built against.
///
/// Every method must be safe to call concurrently from any thread and must not block the caller
/// for longer than it takes to enqueue the work (the actual timer firing / job execution happens
/// later, on whatever thread the implementor chooses).
pub trait Scheduler: Send + Sync + 'static {
    /// Arms `node` to fire after `duration`. The scheduler must eventually call
    /// [`TimerNode::fire`](crate::timer::registry::TimerNode) (directly or indirectly) exactly
    /// once, from one of its own threads, unless the node is cancelled first.
    fn submit_timer(&self, duration: std::time::Duration, node: Arc<TimerNode>);

    /// Best-effort, idempotent cancellation of a previously submitted timer. Implementors may
    /// treat this as a no-op and rely on `node`'s own `in_map` flag to make a late fire harmless
    /// (this is what [`DefaultScheduler`] does: see its module docs).
    fn cancel_timer(&self, node: &Arc<TimerNode>);

    /// Runs `job` to completion on a worker thread. `pool` selects a named sub-pool; an unknown
    /// or absent name falls back to the default pool.
    fn submit_go(&self, pool: Option<&str>, job: Job);

    /// Like [`submit_go`](Scheduler::submit_go), but records that `job` belongs to `series` so an
    /// embedder that cares about ordering can serialize jobs sharing a series. `DefaultScheduler`
    /// does not serialize by series (its pools are already just worker queues); the parameter
    /// exists so the core's public API has somewhere to route `detach_on_series`.
    fn submit_series(&self, series: &Series, job: Job);

    /// True while the scheduler is tearing down; once true, new waits should resolve as
    /// `Status::Aborted` rather than being submitted.
    fn is_shutting_down(&self) -> bool {
        false
    }
}

static SCHEDULER: Lazy<Arc<dyn Scheduler>> =
    Lazy::new(|| Arc::new(DefaultScheduler::new(crate::configure::global())));

/// Returns the process-wide scheduler, constructing the default one (sized from
/// [`crate::configure::global`]) on first use.
pub fn global() -> Arc<dyn Scheduler> {
    SCHEDULER.clone()
}
