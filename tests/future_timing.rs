//! Seed scenario: `Promise<i32>`; a detached task sets 42 after 300ms. `wait_for(200ms)` must
//! time out first; a subsequent `wait()` must observe `Ready`, and `get()` must yield 42.

use coke::sync::future::{channel, FutureStatus};
use coke::sync::sync_wait;
use coke::Task;
use std::time::Duration;

#[test]
fn wait_for_times_out_then_wait_succeeds() {
    let (mut promise, future) = channel::<i32>();

    Task::new(async move {
        coke::sleep(Duration::from_millis(300)).await;
        let _ = promise.set_value(42);
    })
    .detach();

    let result = sync_wait(Task::new(async move {
        let timed_out = future.wait_for(Duration::from_millis(200)).await;
        assert_eq!(timed_out, FutureStatus::Timeout);

        let ready = future.wait().await;
        assert_eq!(ready, FutureStatus::Ready);

        future.get().unwrap()
    }));

    assert_eq!(result, 42);
}
