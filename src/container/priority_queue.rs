//! Priority-ordered async container. Grounded on `coke/queue.h`'s `WFPriorityQueue` variant.

use std::collections::BinaryHeap;
use std::ops::Deref;

use super::bounded::Bounded;

/// A bounded, closeable, async priority queue. `pop` always returns the maximum remaining
/// element per `T`'s `Ord` implementation; wrap in `std::cmp::Reverse` for a min-heap.
pub struct PriorityQueue<T: Ord> {
    inner: Bounded<T, BinaryHeap<T>>,
}

impl<T: Ord + Send + 'static> PriorityQueue<T> {
    pub fn new(capacity: usize) -> Self {
        PriorityQueue {
            inner: Bounded::new(capacity),
        }
    }
}

impl<T: Ord + Send + 'static> Deref for PriorityQueue<T> {
    type Target = Bounded<T, BinaryHeap<T>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync::helpers::sync_wait;
    use crate::task::Task;

    #[test]
    fn pops_in_priority_order() {
        let pq: PriorityQueue<i32> = PriorityQueue::new(8);
        pq.try_push_range(vec![3, 1, 4, 1, 5, 9, 2, 6]);
        let result = sync_wait(Task::new(async move {
            let mut out = Vec::new();
            while let Ok(v) = pq.try_pop() {
                out.push(v);
            }
            out
        }));
        assert_eq!(result, vec![9, 6, 5, 4, 3, 2, 1, 1]);
    }
}
