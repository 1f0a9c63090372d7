//! Seed scenario: 16 tasks each performing 128 lock/unlock pairs; at no observation point may
//! concurrency inside the critical section exceed 1, and the final tally must be exact.

use coke::sync::{sync_wait, Mutex};
use coke::Task;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WORKERS: usize = 16;
const ITERS: usize = 128;

#[test]
fn mutex_cycling_never_observes_concurrent_holders() {
    let mutex = Arc::new(Mutex::new(0i64));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicI64::new(0));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let mutex = mutex.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let total = total.clone();
            std::thread::spawn(move || {
                sync_wait(Task::new(async move {
                    for _ in 0..ITERS {
                        let mut guard = mutex.lock().await;
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_micros(1));
                        active.fetch_sub(1, Ordering::SeqCst);
                        *guard += 1;
                        total.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(total.load(Ordering::SeqCst), (WORKERS * ITERS) as i64);

    let stored = sync_wait(Task::new({
        let mutex = mutex.clone();
        async move { *mutex.lock().await }
    }));
    assert_eq!(stored, (WORKERS * ITERS) as i64);
}
