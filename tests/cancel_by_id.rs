//! Seed scenario: start 10 sleeps under the same id for 10s each; `cancel_sleep_by_id(id, 3)`
//! must wake exactly 3 with `Status::Canceled`, leaving the other 7 still parked.

use coke::sync::sync_wait;
use coke::{cancel_sleep_by_id, get_unique_id, sleep_by_id, Status, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn cancel_sleep_by_id_wakes_exactly_n() {
    let id = get_unique_id();
    let canceled = Arc::new(AtomicUsize::new(0));
    let unexpected = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let canceled = canceled.clone();
            let unexpected = unexpected.clone();
            std::thread::spawn(move || {
                let status = sync_wait(Task::new(async move {
                    sleep_by_id(id, Duration::from_secs(10), false).await
                }));
                match status {
                    Status::Canceled => {
                        canceled.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {
                        unexpected.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    // Give every sleep a moment to register under `id` before cancelling.
    std::thread::sleep(Duration::from_millis(50));

    let cancelled_now = cancel_sleep_by_id(id, 3);
    assert_eq!(cancelled_now, 3);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(canceled.load(Ordering::SeqCst), 3);
    assert_eq!(unexpected.load(Ordering::SeqCst), 0);

    // The remaining 7 really are still parked, not merely slow to observe; cancel them
    // explicitly instead of waiting out the full 10s deadline.
    let remaining = cancel_sleep_by_id(id, usize::MAX);
    assert_eq!(remaining, 7);

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(canceled.load(Ordering::SeqCst), 10);
    assert_eq!(unexpected.load(Ordering::SeqCst), 0);
}

#[test]
fn cancel_sleep_by_id_on_unregistered_key_is_noop() {
    let id = get_unique_id();
    assert_eq!(cancel_sleep_by_id(id, 5), 0);
}
