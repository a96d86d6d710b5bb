//! Active registry: concurrent id -> task map of every live task.

use std::sync::Arc;

use dashmap::DashMap;

use crate::task::Task;
use crate::types::TaskId;

/// Holds one entry per live task. Safe to read and modify from any thread.
///
/// Removal is exactly-once: [`remove_task`](ActiveRegistry::remove_task) only
/// succeeds for the caller that actually takes the entry out.
pub(crate) struct ActiveRegistry {
    tasks: DashMap<TaskId, Arc<Task>>,
}

impl ActiveRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: DashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&self, task: Arc<Task>) {
        let id = task.id();
        if self.tasks.insert(id, task).is_some() {
            tracing::error!(task_id = id, "duplicate task id in active registry");
        }
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove `task`, but only if the registered entry is that same task.
    pub(crate) fn remove_task(&self, task: &Arc<Task>) -> bool {
        self.tasks
            .remove_if(&task.id(), |_, registered| Arc::ptr_eq(registered, task))
            .is_some()
    }

    /// Snapshot of the tasks matching `pred`.
    pub(crate) fn matching(&self, mut pred: impl FnMut(&Task) -> bool) -> Vec<Arc<Task>> {
        self.tasks
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::make_task;

    #[test]
    fn removal_is_exactly_once() {
        let registry = ActiveRegistry::with_capacity(8);
        let task = Arc::new(make_task(1, "a", -1));
        registry.insert(Arc::clone(&task));
        assert!(registry.get(1).is_some());

        assert!(registry.remove_task(&task));
        assert!(!registry.remove_task(&task));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_ignores_foreign_entry_with_same_id() {
        let registry = ActiveRegistry::with_capacity(8);
        let registered = Arc::new(make_task(1, "a", -1));
        let impostor = Arc::new(make_task(1, "a", -1));
        registry.insert(Arc::clone(&registered));

        assert!(!registry.remove_task(&impostor));
        assert!(registry.get(1).is_some());
    }

    #[test]
    fn matching_filters_by_owner() {
        let registry = ActiveRegistry::with_capacity(8);
        registry.insert(Arc::new(make_task(1, "a", -1)));
        registry.insert(Arc::new(make_task(2, "b", -1)));
        registry.insert(Arc::new(make_task(3, "a", 5)));

        let mut ids: Vec<_> = registry
            .matching(|t| t.owner().name() == "a")
            .iter()
            .map(|t| t.id())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }
}
