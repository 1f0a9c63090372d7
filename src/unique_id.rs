//! Process-wide monotonic id generator.
//!
//! Mirrors `coke::get_unique_id`: a plain counter, skipping the sentinel value `0` so it can be
//! used to mean "no id was supplied" wherever callers accept an optional uid.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel returned by nothing this crate generates; reserved to mean "invalid / not supplied".
pub const INVALID_UNIQUE_ID: u64 = 0;

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh, nonzero, process-wide unique id.
///
/// Ids are handed out in increasing order but callers must not rely on any particular stride:
/// only uniqueness and non-zero-ness are guaranteed.
pub fn get_unique_id() -> u64 {
    loop {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        if id != INVALID_UNIQUE_ID {
            return id;
        }
        // fetch_add wrapped all the way around to 0; extremely unlikely, but skip it rather
        // than hand out the sentinel.
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_nonzero_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = get_unique_id();
            assert_ne!(id, INVALID_UNIQUE_ID);
            assert!(seen.insert(id));
        }
    }
}
