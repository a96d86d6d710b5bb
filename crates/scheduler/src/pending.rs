//! Time-ordered pending queue, owned by a single tick loop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::task::Task;

struct Entry {
    next_run: i64,
    task: Arc<Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, we pop the earliest run first.
    // Equal run times fall back to id, i.e. submission order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .next_run
            .cmp(&self.next_run)
            .then_with(|| other.task.id().cmp(&self.task.id()))
    }
}

/// Min-heap of queued tasks keyed by `(next_run, id)`.
///
/// The key is captured on push; a task's `next_run` is only changed while it
/// is out of the heap.
pub(crate) struct PendingQueue {
    heap: BinaryHeap<Entry>,
}

impl PendingQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, task: Arc<Task>) {
        self.heap.push(Entry {
            next_run: task.next_run(),
            task,
        });
    }

    pub(crate) fn peek(&self) -> Option<&Arc<Task>> {
        self.heap.peek().map(|e| &e.task)
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<Task>> {
        self.heap.pop().map(|e| e.task)
    }

    /// Remove every task matching `pred`, returning them.
    pub(crate) fn extract_if(&mut self, mut pred: impl FnMut(&Task) -> bool) -> Vec<Arc<Task>> {
        let mut removed = Vec::new();
        self.heap.retain(|e| {
            if pred(&e.task) {
                removed.push(Arc::clone(&e.task));
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::make_task;

    fn queued(id: i64, next_run: i64) -> Arc<Task> {
        let task = Arc::new(make_task(id, "q", -1));
        task.set_next_run(next_run);
        task
    }

    #[test]
    fn pops_earliest_first() {
        let mut pending = PendingQueue::with_capacity(4);
        pending.push(queued(1, 30));
        pending.push(queued(2, 10));
        pending.push(queued(3, 20));

        let order: Vec<i64> = std::iter::from_fn(|| pending.pop()).map(|t| t.id()).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn ties_break_by_submission_order() {
        let mut pending = PendingQueue::with_capacity(4);
        pending.push(queued(7, 5));
        pending.push(queued(3, 5));
        pending.push(queued(5, 5));

        assert_eq!(pending.peek().map(|t| t.id()), Some(3));
        let order: Vec<i64> = std::iter::from_fn(|| pending.pop()).map(|t| t.id()).collect();
        assert_eq!(order, vec![3, 5, 7]);
    }

    #[test]
    fn extract_if_removes_matches_only() {
        let mut pending = PendingQueue::with_capacity(4);
        for id in 1..=6 {
            pending.push(queued(id, id * 10));
        }
        let removed = pending.extract_if(|t| t.id() % 2 == 0);
        assert_eq!(removed.len(), 3);
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.pop().map(|t| t.id()), Some(1));
    }
}
