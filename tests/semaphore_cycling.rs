//! Seed scenario: Semaphore(n=16), 16 tasks each doing 128 acquire/release cycles. Observed
//! concurrency must stay within [1, 16] and the total tally must be exact.

use coke::sync::{sync_wait, Semaphore};
use coke::{Status, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WORKERS: usize = 16;
const ITERS: usize = 128;
const PERMITS: usize = 16;

#[test]
fn semaphore_cycling_bounds_concurrency() {
    let sem = Arc::new(Semaphore::new(PERMITS));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let sem = sem.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let total = total.clone();
            std::thread::spawn(move || {
                sync_wait(Task::new(async move {
                    for _ in 0..ITERS {
                        let status = sem.acquire().await;
                        assert_eq!(status, Status::Success);
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        assert!(now <= PERMITS);
                        std::thread::sleep(Duration::from_micros(1));
                        active.fetch_sub(1, Ordering::SeqCst);
                        total.fetch_add(1, Ordering::SeqCst);
                        sem.release(1);
                    }
                }));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(total.load(Ordering::SeqCst), WORKERS * ITERS);
    let observed_max = max_active.load(Ordering::SeqCst);
    assert!(observed_max >= 1 && observed_max <= PERMITS);
}
