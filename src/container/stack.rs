//! LIFO async container. Grounded on `coke/queue.h`'s stack discipline variant.

use std::ops::Deref;

use super::bounded::Bounded;

/// A bounded, closeable, async LIFO stack.
pub struct Stack<T> {
    inner: Bounded<T, Vec<T>>,
}

impl<T: Send + 'static> Stack<T> {
    pub fn new(capacity: usize) -> Self {
        Stack {
            inner: Bounded::new(capacity),
        }
    }
}

impl<T: Send + 'static> Deref for Stack<T> {
    type Target = Bounded<T, Vec<T>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
