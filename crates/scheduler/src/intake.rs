//! Submission queue: the lock-free intake every producer thread appends to.
//!
//! Producers never block. Exactly one thread per time domain consumes, and a
//! single drain pass only takes what was visible when it started, so work
//! appended during the pass waits for the next one.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use tickforge_core::Owner;

use crate::task::Task;
use crate::types::TaskId;

/// What a cancellation control task targets.
#[derive(Debug, Clone)]
pub(crate) enum CancelScope {
    Task(TaskId),
    Owner(Owner),
    All,
}

impl CancelScope {
    pub(crate) fn matches(&self, task: &Task) -> bool {
        match self {
            CancelScope::Task(id) => task.id() == *id,
            CancelScope::Owner(owner) => task.owner() == owner,
            CancelScope::All => true,
        }
    }
}

/// An entry in the submission queue.
pub(crate) enum Submission {
    /// Ordinary work, moved into the pending queue by the drain pass.
    Task(Arc<Task>),
    /// Internal control work, executed inline by the drain pass itself.
    Control(CancelScope),
}

pub(crate) struct SubmissionQueue {
    queue: SegQueue<Submission>,
}

impl SubmissionQueue {
    pub(crate) fn new() -> Self {
        Self { queue: SegQueue::new() }
    }

    /// Append from any thread.
    pub(crate) fn append(&self, submission: Submission) {
        self.queue.push(submission);
    }

    /// Take the entries visible right now, in submission order.
    ///
    /// Must only be called from the domain's tick thread.
    pub(crate) fn drain_visible(&self) -> impl Iterator<Item = Submission> + '_ {
        let visible = self.queue.len();
        (0..visible).map_while(move |_| self.queue.pop())
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::make_task;

    fn ids(queue: &SubmissionQueue) -> Vec<TaskId> {
        queue
            .drain_visible()
            .map(|s| match s {
                Submission::Task(task) => task.id(),
                Submission::Control(_) => 0,
            })
            .collect()
    }

    #[test]
    fn drains_in_submission_order() {
        let queue = SubmissionQueue::new();
        queue.append(Submission::Task(Arc::new(make_task(1, "a", -1))));
        queue.append(Submission::Control(CancelScope::All));
        queue.append(Submission::Task(Arc::new(make_task(2, "a", -1))));

        assert_eq!(ids(&queue), vec![1, 0, 2]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn drain_stops_at_snapshot() {
        let queue = SubmissionQueue::new();
        queue.append(Submission::Task(Arc::new(make_task(1, "a", -1))));

        let mut drained = Vec::new();
        for submission in queue.drain_visible() {
            if let Submission::Task(task) = submission {
                drained.push(task.id());
                // Appended mid-pass: left for the next drain.
                queue.append(Submission::Task(Arc::new(make_task(task.id() + 1, "a", -1))));
            }
        }
        assert_eq!(drained, vec![1]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn scope_matching() {
        let task = make_task(9, "physics", -1);
        assert!(CancelScope::Task(9).matches(&task));
        assert!(!CancelScope::Task(10).matches(&task));
        assert!(CancelScope::Owner(Owner::new("physics").unwrap()).matches(&task));
        assert!(!CancelScope::Owner(Owner::new("chat").unwrap()).matches(&task));
        assert!(CancelScope::All.matches(&task));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(SubmissionQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.append(Submission::Task(Arc::new(make_task(t * 1000 + i + 1, "p", -1))));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = ids(&queue);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }
}
