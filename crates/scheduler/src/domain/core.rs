use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use tickforge_core::{Owner, SyncContext};

use crate::builder::TaskPlan;
use crate::future::{CallFuture, CallSlot};
use crate::intake::{Submission, SubmissionQueue};
use crate::metrics::SchedulerMetrics;
use crate::pending::PendingQueue;
use crate::registry::ActiveRegistry;
use crate::task::{CallCell, Task, TaskBody, TaskHandle, TaskParts, WorkerInfo};
use crate::types::{is_external_id, ExecutionMode, SchedulerConfig, TaskId, TimeDomain, PERIOD_SINGLE};

/// State touched only by the thread currently running `tick`.
pub(super) struct LoopState {
    pub(super) pending: PendingQueue,
    /// Periodic tasks that ran this tick, merged back once the ready loop ends.
    pub(super) held: Vec<Arc<Task>>,
}

/// Machinery shared by both time domains.
pub struct SchedulerCore {
    pub(super) domain: TimeDomain,
    /// Shared with the other domain so ids are unique across the runtime.
    pub(super) ids: Arc<AtomicI64>,
    pub(super) main_context: Arc<SyncContext>,
    pub(super) intake: SubmissionQueue,
    pub(super) registry: Arc<ActiveRegistry>,
    pub(super) loop_state: Mutex<LoopState>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Time observed by the most recent tick.
    pub(super) now: AtomicI64,
}

impl SchedulerCore {
    pub(crate) fn new(
        domain: TimeDomain,
        ids: Arc<AtomicI64>,
        main_context: Arc<SyncContext>,
        config: &SchedulerConfig,
        start_time: i64,
    ) -> Self {
        Self {
            domain,
            ids,
            main_context,
            intake: SubmissionQueue::new(),
            registry: Arc::new(ActiveRegistry::with_capacity(config.pending_capacity)),
            loop_state: Mutex::new(LoopState {
                pending: PendingQueue::with_capacity(config.pending_capacity),
                held: Vec::with_capacity(config.reschedule_capacity),
            }),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::new(domain))),
            now: AtomicI64::new(start_time),
        }
    }

    pub fn domain(&self) -> TimeDomain {
        self.domain
    }

    /// Time observed by the most recent tick (or the start time).
    pub fn now(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }

    fn next_id(&self) -> TaskId {
        self.ids.fetch_add(1, Ordering::SeqCst)
    }

    pub(super) fn build_task(&self, plan: TaskPlan) -> Arc<Task> {
        let id = self.next_id();
        let sync_context = match plan.mode {
            ExecutionMode::Synchronous => {
                Some(plan.sync_context.unwrap_or_else(|| Arc::clone(&self.main_context)))
            }
            ExecutionMode::Asynchronous => None,
        };
        let name = plan
            .name
            .unwrap_or_else(|| format!("{}-task-{}", plan.owner, id));
        Arc::new(Task::new(TaskParts {
            id,
            name,
            owner: plan.owner,
            mode: plan.mode,
            domain: self.domain,
            sync_context,
            period: plan.period,
            body: TaskBody::Runnable(plan.body),
        }))
    }

    /// Register `task`, due at `next_run`, and append it to the submission
    /// queue. Lock-free.
    ///
    /// Callers compute `next_run` from their domain's time at submission.
    pub(super) fn enqueue(&self, task: Arc<Task>, next_run: i64) -> TaskHandle {
        task.set_next_run(next_run);
        self.registry.insert(Arc::clone(&task));
        self.intake.append(Submission::Task(Arc::clone(&task)));
        debug!(
            domain = %self.domain,
            task_id = task.id(),
            owner = %task.owner(),
            next_run = task.next_run(),
            period = task.period(),
            "task submitted"
        );
        task
    }

    /// Schedule `computation` to run once on `context` (the primary context
    /// when `None`) and return a handle to its outcome.
    pub fn call_on_context<T, F>(
        &self,
        owner: Owner,
        computation: F,
        context: Option<Arc<SyncContext>>,
    ) -> CallFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let id = self.next_id();
        let slot = Arc::new(CallSlot::new(computation));
        let task = Arc::new(Task::new(TaskParts {
            id,
            name: format!("{}-call-{}", owner, id),
            owner,
            mode: ExecutionMode::Synchronous,
            domain: self.domain,
            sync_context: Some(context.unwrap_or_else(|| Arc::clone(&self.main_context))),
            period: PERIOD_SINGLE,
            body: TaskBody::Call(Arc::clone(&slot) as Arc<dyn CallCell>),
        }));
        CallFuture::new(self.enqueue(task, self.now()), slot)
    }

    /// Whether a body of task `id` is executing right now.
    pub fn is_running(&self, id: TaskId) -> bool {
        is_external_id(id) && self.registry.get(id).is_some_and(|t| t.is_running())
    }

    /// Whether task `id` is live here: submitted, queued, running or recurring,
    /// and not cancelled.
    pub fn is_queued(&self, id: TaskId) -> bool {
        is_external_id(id) && self.registry.get(id).is_some_and(|t| t.is_live())
    }

    /// Live tasks of this domain, by id.
    pub fn pending_tasks(&self) -> Vec<TaskHandle> {
        let mut tasks = self.registry.matching(|t| t.is_live());
        tasks.sort_unstable_by_key(|t| t.id());
        tasks
    }

    /// Workers currently executing asynchronous bodies of this domain.
    pub fn active_workers(&self) -> Vec<WorkerInfo> {
        self.registry
            .matching(|t| t.is_async())
            .iter()
            .flat_map(|t| t.workers())
            .collect()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.read().clone()
    }

    /// Submissions not yet drained.
    pub fn undrained(&self) -> usize {
        self.intake.len()
    }

    /// Drop a cancelled task from the registry, unless a worker still runs it
    /// (the worker removes it when it finishes).
    pub(super) fn release_cancelled(&self, task: &Arc<Task>) {
        if task.is_async() && task.has_workers() {
            return;
        }
        if self.registry.remove_task(task) {
            self.metrics.write().record_cancellation(task.owner().name());
            debug!(domain = %self.domain, task_id = task.id(), "cancelled task released");
        }
    }
}
