//! Global, once-set library configuration.
//!
//! Mirrors `coke/global.h`'s `GlobalSettings`/`library_init`: a handful of pool-size knobs and a
//! default timeout, readable from anywhere once set, with sane defaults if the caller never
//! bothers to call [`library_init`] at all.

use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::error::CokeError;

/// Pool sizes and defaults handed to the crate's [`DefaultScheduler`](crate::scheduler::DefaultScheduler)
/// the first time it is needed.
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    /// Worker threads backing the default ("handler") go-pool, used by `detach()`, `go()` and
    /// `submit_go()` when no pool name is given.
    pub handler_threads: usize,
    /// Worker threads backing the named "compute" pool, meant for CPU-bound work moved off a
    /// poller thread via `switch_go_thread("compute")`.
    pub compute_threads: usize,
    /// Worker threads backing the named "poller" pool. The core has no I/O of its own, but this
    /// is kept so a `Scheduler` embedder has somewhere to size a poller-like pool.
    pub poller_threads: usize,
    /// Default timeout used by helpers that accept an optional deadline and receive none.
    pub default_timeout: Duration,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        GlobalSettings {
            handler_threads: cpus,
            compute_threads: cpus,
            poller_threads: 1,
            default_timeout: Duration::from_secs(10),
        }
    }
}

static SETTINGS: OnceCell<GlobalSettings> = OnceCell::new();

/// Sets the process-wide configuration. Must be called, if at all, before the first use of any
/// coke primitive (the first use lazily initializes the default scheduler with whatever settings
/// are current at that time).
///
/// # Errors
/// Returns [`CokeError::AlreadyInitialized`] if `library_init` was already called, or if the
/// defaults were already materialized by an earlier primitive use.
pub fn library_init(settings: GlobalSettings) -> Result<(), CokeError> {
    SETTINGS
        .set(settings)
        .map_err(|_| CokeError::AlreadyInitialized)
}

/// Returns the current settings, materializing the default set if nothing was ever configured.
pub fn global() -> &'static GlobalSettings {
    SETTINGS.get_or_init(GlobalSettings::default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let settings = GlobalSettings::default();
        assert!(settings.handler_threads >= 1);
        assert!(settings.compute_threads >= 1);
        assert!(settings.poller_threads >= 1);
    }
}
