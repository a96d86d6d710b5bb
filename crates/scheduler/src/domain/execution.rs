use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::future::panic_message;
use crate::metrics::SchedulerMetrics;
use crate::registry::ActiveRegistry;
use crate::task::{Task, WorkerInfo};

use super::core::{LoopState, SchedulerCore};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

impl SchedulerCore {
    /// One tick of this domain: drain, run every ready task, reschedule.
    ///
    /// `dispatch` receives ready asynchronous tasks. Must not be called
    /// concurrently with itself; a re-entrant or concurrent call is ignored.
    pub(super) fn run_tick(&self, now: i64, with_async: bool, dispatch: &dyn Fn(Arc<Task>)) {
        let Some(mut guard) = self.loop_state.try_lock() else {
            warn!(domain = %self.domain, now, "tick already in progress, ignoring re-entrant tick");
            return;
        };
        let state = &mut *guard;
        self.now.store(now, Ordering::Release);
        let driver = thread::current().id();

        self.drain(state);
        while let Some(task) = self.pop_ready(state, now, with_async, driver) {
            if task.is_async() {
                dispatch(Arc::clone(&task));
                self.metrics.write().tasks_dispatched += 1;
            } else {
                self.execute_inline(&task);
                // The body may have submitted work that is due this same tick.
                self.drain(state);
            }

            if task.is_cancelled() {
                self.release_cancelled(&task);
            } else if task.is_periodic() {
                task.set_next_run(now.saturating_add(task.period()));
                state.held.push(task);
            } else if !task.is_async() {
                task.retire();
                self.registry.remove_task(&task);
            }
        }

        // Merged back only now: with a clock that does not advance inside a
        // tick, a rescheduled task would otherwise be ready again at once.
        let LoopState { pending, held } = state;
        for task in held.drain(..) {
            pending.push(task);
        }
        self.metrics.write().last_tick = now;
    }

    /// Pop the earliest task if it may run now on this thread. Cancelled
    /// tasks found at the head are swept.
    fn pop_ready(
        &self,
        state: &mut LoopState,
        now: i64,
        with_async: bool,
        driver: ThreadId,
    ) -> Option<Arc<Task>> {
        loop {
            let (cancelled, ready) = {
                let head = state.pending.peek()?;
                (head.is_cancelled(), is_ready(head, now, with_async, driver))
            };
            if cancelled {
                if let Some(task) = state.pending.pop() {
                    self.release_cancelled(&task);
                }
                continue;
            }
            return if ready { state.pending.pop() } else { None };
        }
    }

    fn execute_inline(&self, task: &Arc<Task>) {
        if !task.begin_run() {
            return;
        }
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.run_body()));
        task.end_run();
        record_outcome(&self.metrics, task, result, started.elapsed());
    }
}

/// Readiness: due, and either async on a full tick or sync on its context's thread.
fn is_ready(task: &Task, now: i64, with_async: bool, driver: ThreadId) -> bool {
    if task.next_run() > now {
        return false;
    }
    if task.is_async() {
        // Partial ticks must not trigger async dispatch.
        return with_async;
    }
    task.sync_context()
        .is_some_and(|ctx| ctx.is_driven_by(driver))
}

/// Body of an asynchronous task on a worker thread.
///
/// The worker owns retirement: it removes one-shot and cancelled tasks from
/// the registry once its run is over.
pub(crate) fn run_async(task: &Arc<Task>, registry: &ActiveRegistry, metrics: &RwLock<SchedulerMetrics>) {
    if !task.begin_run() {
        if registry.remove_task(task) {
            metrics.write().record_cancellation(task.owner().name());
        }
        return;
    }

    let worker_id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
    let thread_name = thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", thread::current().id()));
    task.add_worker(WorkerInfo {
        worker_id,
        task_id: task.id(),
        owner: task.owner().to_string(),
        thread_name,
        started_at: Utc::now(),
    });

    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| task.run_body()));
    task.remove_worker(worker_id);
    task.end_run();
    record_outcome(metrics, task, result, started.elapsed());

    if task.is_cancelled() {
        if registry.remove_task(task) {
            metrics.write().record_cancellation(task.owner().name());
        }
    } else if !task.is_periodic() {
        registry.remove_task(task);
    }
}

/// Log and count a finished body. Failures never propagate past this point.
fn record_outcome(
    metrics: &RwLock<SchedulerMetrics>,
    task: &Task,
    result: thread::Result<anyhow::Result<()>>,
    elapsed: Duration,
) {
    let owner = task.owner().name();
    match result {
        Ok(Ok(())) => {
            debug!(task_id = task.id(), owner, ?elapsed, "task completed");
            metrics.write().record_execution(owner, elapsed);
        }
        Ok(Err(e)) => {
            error!(task_id = task.id(), task = task.name(), owner, error = %e, "task generated an error");
            metrics.write().record_failure(owner);
        }
        Err(payload) => {
            error!(
                task_id = task.id(),
                task = task.name(),
                owner,
                panic = %panic_message(payload.as_ref()),
                "task panicked"
            );
            metrics.write().record_failure(owner);
        }
    }
}
