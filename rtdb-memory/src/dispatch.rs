//! Ordered callback delivery
//!
//! Mutations run under a re-entrant delivery lock and queue the callbacks
//! they produce. Whichever call holds the lock first drains the queue, so
//! callbacks are delivered in the order their mutations were applied, across
//! threads and for mutations made from inside a callback.

use std::cell::RefCell;
use std::collections::VecDeque;

use parking_lot::ReentrantMutex;
use tracing::trace;

/// A callback produced by a mutation
pub(crate) trait Deliver {
    fn deliver(self);
}

struct Queue<N> {
    pending: VecDeque<N>,
    draining: bool,
}

pub(crate) struct Dispatcher<N> {
    queue: ReentrantMutex<RefCell<Queue<N>>>,
}

impl<N: Deliver> Dispatcher<N> {
    pub(crate) fn new() -> Self {
        Self {
            queue: ReentrantMutex::new(RefCell::new(Queue {
                pending: VecDeque::new(),
                draining: false,
            })),
        }
    }

    /// Run `mutate` under the delivery lock and deliver what it produced.
    ///
    /// A call made from inside a callback only queues; the outer call
    /// delivers its callbacks after the current one returns.
    pub(crate) fn run<R, F>(&self, mutate: F) -> R
    where
        F: FnOnce() -> (R, Vec<N>),
    {
        let queue = self.queue.lock();
        let (result, notifications) = mutate();

        {
            let mut q = queue.borrow_mut();
            q.pending.extend(notifications);
            if q.draining {
                return result;
            }
            q.draining = true;
        }

        let _draining = Draining(&*queue);
        let mut delivered = 0usize;
        loop {
            let next = queue.borrow_mut().pending.pop_front();
            let Some(notification) = next else {
                break;
            };
            notification.deliver();
            delivered += 1;
        }
        if delivered > 0 {
            trace!("Delivered {} listener callbacks", delivered);
        }
        result
    }
}

impl<N: Deliver> Default for Dispatcher<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the draining flag even when a callback panics
struct Draining<'a, N>(&'a RefCell<Queue<N>>);

impl<N> Drop for Draining<'_, N> {
    fn drop(&mut self) {
        self.0.borrow_mut().draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Record(Arc<Mutex<Vec<u32>>>, u32);

    impl Deliver for Record {
        fn deliver(self) {
            self.0.lock().push(self.1);
        }
    }

    #[test]
    fn test_delivers_in_mutation_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();

        let n = dispatcher.run(|| (7, vec![Record(seen.clone(), 1), Record(seen.clone(), 2)]));
        dispatcher.run(|| ((), vec![Record(seen.clone(), 3)]));

        assert_eq!(n, 7);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    enum Nested {
        Outer(Arc<Dispatcher<Nested>>, Arc<Mutex<Vec<u32>>>),
        Leaf(Arc<Mutex<Vec<u32>>>, u32),
    }

    impl Deliver for Nested {
        fn deliver(self) {
            match self {
                Nested::Outer(dispatcher, seen) => {
                    seen.lock().push(1);
                    let inner = Arc::clone(&seen);
                    dispatcher.run(move || ((), vec![Nested::Leaf(inner, 3)]));
                    // Queued, not delivered yet
                    assert_eq!(*seen.lock(), vec![1]);
                }
                Nested::Leaf(seen, n) => seen.lock().push(n),
            }
        }
    }

    #[test]
    fn test_reentrant_run_queues_behind_current_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new());

        let outer = Nested::Outer(Arc::clone(&dispatcher), Arc::clone(&seen));
        let second = Nested::Leaf(Arc::clone(&seen), 2);
        dispatcher.run(|| ((), vec![outer, second]));

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
