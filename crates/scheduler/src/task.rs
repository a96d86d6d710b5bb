use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use tickforge_core::{Owner, SyncContext};

use super::types::{ExecutionMode, TaskId, TimeDomain, PERIOD_SINGLE};

/// A task body. Returning `Err` is a task failure, attributed to the owner.
pub type TaskFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;

/// Handle returned to submitters.
pub type TaskHandle = Arc<Task>;

/// Lifecycle state of a task.
///
/// `Cancelled` and `Retired` are terminal. A periodic task cycles
/// `Queued -> Running -> Queued` until cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum TaskState {
    Submitted = 0,
    Queued = 1,
    Running = 2,
    Retired = 3,
    Cancelled = 4,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Submitted,
            1 => TaskState::Queued,
            2 => TaskState::Running,
            3 => TaskState::Retired,
            _ => TaskState::Cancelled,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, TaskState::Retired | TaskState::Cancelled)
    }
}

/// A worker thread currently executing an asynchronous task body.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub worker_id: u64,
    pub task_id: TaskId,
    pub owner: String,
    pub thread_name: String,
    pub started_at: DateTime<Utc>,
}

/// Body of a synchronous call: completes a waiter instead of returning.
pub(crate) trait CallCell: Send + Sync {
    /// Run the computation and publish its outcome.
    fn execute(&self);
    /// Publish "cancelled" if nothing was published yet.
    fn abandon(&self);
}

pub(crate) enum TaskBody {
    Runnable(Arc<TaskFn>),
    Call(Arc<dyn CallCell>),
}

/// A unit of schedulable work.
pub struct Task {
    id: TaskId,
    name: String,
    owner: Owner,
    mode: ExecutionMode,
    domain: TimeDomain,
    sync_context: Option<Arc<SyncContext>>,
    period: i64,
    next_run: AtomicI64,
    state: AtomicU8,
    workers: Mutex<Vec<WorkerInfo>>,
    body: TaskBody,
}

pub(crate) struct TaskParts {
    pub id: TaskId,
    pub name: String,
    pub owner: Owner,
    pub mode: ExecutionMode,
    pub domain: TimeDomain,
    pub sync_context: Option<Arc<SyncContext>>,
    pub period: i64,
    pub body: TaskBody,
}

impl Task {
    pub(crate) fn new(parts: TaskParts) -> Self {
        Self {
            id: parts.id,
            name: parts.name,
            owner: parts.owner,
            mode: parts.mode,
            domain: parts.domain,
            sync_context: parts.sync_context,
            period: parts.period,
            next_run: AtomicI64::new(0),
            state: AtomicU8::new(TaskState::Submitted as u8),
            workers: Mutex::new(Vec::new()),
            body: parts.body,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        self.mode == ExecutionMode::Asynchronous
    }

    pub fn domain(&self) -> TimeDomain {
        self.domain
    }

    pub fn sync_context(&self) -> Option<&Arc<SyncContext>> {
        self.sync_context.as_ref()
    }

    /// Repeat period, or [`PERIOD_SINGLE`] for one-shot tasks.
    pub fn period(&self) -> i64 {
        self.period
    }

    pub fn is_periodic(&self) -> bool {
        self.period > 0
    }

    /// Absolute time (tick or millisecond) at which the task is next eligible.
    pub fn next_run(&self) -> i64 {
        self.next_run.load(Ordering::Acquire)
    }

    pub(crate) fn set_next_run(&self, at: i64) {
        self.next_run.store(at, Ordering::Release);
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Whether a body of this task is executing right now (racy by nature).
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running || !self.workers.lock().is_empty()
    }

    /// Whether the task will still run: not retired, not cancelled.
    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Flip the task to `Cancelled`. Monotone and idempotent, callable from
    /// any thread. Returns `true` only for the call that performed the flip.
    ///
    /// A body that is already executing finishes its current run.
    pub fn force_cancel(&self) -> bool {
        let previous = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            if TaskState::from_u8(raw).is_terminal() {
                None
            } else {
                Some(TaskState::Cancelled as u8)
            }
        });
        match previous {
            Ok(raw) => {
                if matches!(TaskState::from_u8(raw), TaskState::Submitted | TaskState::Queued) {
                    if let TaskBody::Call(cell) = &self.body {
                        cell.abandon();
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Cancel only if no run has started yet.
    pub(crate) fn cancel_unstarted(&self) -> bool {
        let flipped = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match TaskState::from_u8(raw) {
                    TaskState::Submitted | TaskState::Queued => Some(TaskState::Cancelled as u8),
                    _ => None,
                }
            })
            .is_ok();
        if flipped {
            if let TaskBody::Call(cell) = &self.body {
                cell.abandon();
            }
        }
        flipped
    }

    /// `Submitted -> Queued`, done once by the drain pass.
    pub(crate) fn mark_queued(&self) {
        let _ = self.transition(TaskState::Submitted, TaskState::Queued);
    }

    /// Enter `Running`. Fails once the task is cancelled or retired.
    pub(crate) fn begin_run(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                if TaskState::from_u8(raw).is_terminal() {
                    None
                } else {
                    Some(TaskState::Running as u8)
                }
            })
            .is_ok()
    }

    /// Leave `Running`: periodic tasks go back to `Queued`, one-shots retire.
    /// A cancellation that arrived mid-run is preserved.
    pub(crate) fn end_run(&self) {
        let next = if self.is_periodic() { TaskState::Queued } else { TaskState::Retired };
        let _ = self.transition(TaskState::Running, next);
    }

    /// Retire a task that will not run again.
    pub(crate) fn retire(&self) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            if TaskState::from_u8(raw).is_terminal() {
                None
            } else {
                Some(TaskState::Retired as u8)
            }
        });
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Execute the body once on the calling thread.
    pub(crate) fn run_body(&self) -> anyhow::Result<()> {
        match &self.body {
            TaskBody::Runnable(body) => body(),
            TaskBody::Call(cell) => {
                cell.execute();
                Ok(())
            }
        }
    }

    pub(crate) fn add_worker(&self, worker: WorkerInfo) {
        self.workers.lock().push(worker);
    }

    pub(crate) fn remove_worker(&self, worker_id: u64) {
        let mut workers = self.workers.lock();
        if let Some(pos) = workers.iter().position(|w| w.worker_id == worker_id) {
            workers.swap_remove(pos);
        }
    }

    pub(crate) fn has_workers(&self) -> bool {
        !self.workers.lock().is_empty()
    }

    /// Snapshot of the workers executing this task.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.lock().clone()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner.name())
            .field("mode", &self.mode)
            .field("domain", &self.domain)
            .field("period", &self.period)
            .field("next_run", &self.next_run())
            .field("state", &self.state())
            .finish()
    }
}
