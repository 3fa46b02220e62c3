//! Multi-producer multi-consumer FIFO for deferred work.
//!
//! A thin wrapper over an unbounded `crossbeam_channel`; `try_pop` is
//! non-blocking and thread-safe, which is all the fiber pool assumes.
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Unbounded concurrent FIFO. Shared by reference (or `Arc`) between any
/// number of producers and consumers.
pub struct TaskQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Enqueues a task. Never blocks.
    pub fn push(&self, task: T) {
        // The queue owns both channel ends, so the send cannot observe a
        // disconnected receiver.
        let _ = self.tx.send(task);
    }

    /// Dequeues the oldest task if one is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Dequeues the oldest task, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn pops_in_fifo_order() {
        let queue = TaskQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_and_consumers_preserve_the_multiset() {
        let queue = Arc::new(TaskQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.push(p * 1000 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().expect("producer does not panic");
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(v) = queue.try_pop() {
                        seen.push(v);
                    }
                    seen
                })
            })
            .collect();
        let mut all: Vec<i32> = consumers
            .into_iter()
            .flat_map(|c| c.join().expect("consumer does not panic"))
            .collect();
        all.sort_unstable();
        let expected: Vec<i32> = (0..4).flat_map(|p| (0..1000).map(move |i| p * 1000 + i)).collect();
        assert_eq!(all, expected);
    }
}
