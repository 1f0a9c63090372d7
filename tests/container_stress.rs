//! Seed scenario: `Queue<String>(capacity = 15)` with 20 producers and 20 consumers. Each
//! producer pushes 200 strings via a randomized mix of `try_push`/`push`/`push_for`; once every
//! producer finishes, `close()` is called. The sum of everything the consumers pop must equal
//! 20 * 200 = 4000.

use coke::container::{PopError, PushError, Queue};
use coke::sync::sync_wait;
use coke::Task;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PRODUCERS: usize = 20;
const CONSUMERS: usize = 20;
const PER_PRODUCER: usize = 200;

#[test]
fn queue_stress_with_producers_and_consumers() {
    let _ = env_logger::try_init();

    let queue: Arc<Queue<String>> = Arc::new(Queue::new(15));
    let consumed = Arc::new(AtomicUsize::new(0));

    let producer_handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            std::thread::spawn(move || {
                sync_wait(Task::new(async move {
                    let mut rng = rand::thread_rng();
                    for i in 0..PER_PRODUCER {
                        let value = format!("p{p}-{i}");
                        match rng.gen_range(0, 3) {
                            0 => {
                                let mut v = value;
                                loop {
                                    match queue.try_push(v) {
                                        Ok(()) => break,
                                        Err(PushError::Full(back)) => {
                                            v = back;
                                            coke::yield_now().await;
                                        }
                                        Err(other) => panic!("unexpected push failure: {other:?}"),
                                    }
                                }
                            }
                            1 => {
                                queue.push(value).await.expect("queue not closed yet");
                            }
                            _ => {
                                let mut v = value;
                                loop {
                                    match queue.push_for(Duration::from_millis(5), v).await {
                                        Ok(()) => break,
                                        Err(PushError::Timeout(back)) => v = back,
                                        Err(other) => panic!("unexpected push failure: {other:?}"),
                                    }
                                }
                            }
                        }
                    }
                }));
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let consumed = consumed.clone();
            std::thread::spawn(move || {
                sync_wait(Task::new(async move {
                    loop {
                        match queue.pop().await {
                            Ok(_value) => {
                                consumed.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(PopError::Closed) => break,
                            Err(other) => panic!("unexpected pop failure: {other:?}"),
                        }
                    }
                }));
            })
        })
        .collect();

    for h in producer_handles {
        h.join().unwrap();
    }
    queue.close();
    for h in consumer_handles {
        h.join().unwrap();
    }

    assert_eq!(consumed.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
}
