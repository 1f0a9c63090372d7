//! FIFO async container. Grounded on `coke/queue.h`.

use std::collections::VecDeque;
use std::ops::Deref;

use super::bounded::Bounded;

/// A bounded, closeable, async FIFO queue.
pub struct Queue<T> {
    inner: Bounded<T, VecDeque<T>>,
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Queue {
            inner: Bounded::new(capacity),
        }
    }
}

impl<T: Send + 'static> Deref for Queue<T> {
    type Target = Bounded<T, VecDeque<T>>;

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
    fn pops_in_fifo_order() {
        let q: Queue<i32> = Queue::new(4);
        q.try_push_range(vec![1, 2, 3]);
        let result = sync_wait(Task::new(async move {
            let mut out = Vec::new();
            for _ in 0..3 {
                out.push(q.pop().await.unwrap());
            }
            out
        }));
        assert_eq!(result, vec![1, 2, 3]);
    }
}
