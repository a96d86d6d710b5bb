use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use tickforge_core::{Owner, SyncContext};

use crate::builder::TaskBuilder;
use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::registry::ActiveRegistry;
use crate::task::{Task, TaskHandle};
use crate::types::{SchedulerConfig, TaskId, TimeDomain};

use super::execution::run_async;
use super::{named_runtime, DomainScheduler, SchedulerCore};

/// Scheduler measured in milliseconds of real time.
///
/// Synchronous work goes through the pending queue like in the tick domain.
/// Asynchronous work never does: it is handed to a small timer runtime that
/// sleeps until the first run and then repeats at a fixed rate.
pub struct WallClockScheduler {
    core: SchedulerCore,
    clock: Arc<dyn Clock>,
    runtime: Option<Runtime>,
    handle: Handle,
    timers: Arc<DashMap<TaskId, AbortHandle>>,
}

impl WallClockScheduler {
    pub fn new(
        config: &SchedulerConfig,
        ids: Arc<AtomicI64>,
        main_context: Arc<SyncContext>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let runtime = named_runtime(
            &config.timer_thread_prefix,
            config.timer_threads,
            config.max_async_workers,
            config.async_worker_keep_alive(),
        )?;
        let handle = runtime.handle().clone();
        info!("Wall-clock scheduler starting with {} timer threads", config.timer_threads);

        let start = clock.now_millis();
        Ok(Self {
            core: SchedulerCore::new(TimeDomain::WallClock, ids, main_context, config, start),
            clock,
            runtime: Some(runtime),
            handle,
            timers: Arc::new(DashMap::new()),
        })
    }

    /// Asynchronous tasks with a live timer.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    fn schedule_timer(&self, task: Arc<Task>, delay: i64) -> TaskHandle {
        task.set_next_run(self.clock.now_millis().saturating_add(delay));
        task.mark_queued();
        self.core.registry.insert(Arc::clone(&task));

        let job = Arc::clone(&task);
        let registry = Arc::clone(&self.core.registry);
        let metrics = Arc::clone(&self.core.metrics);
        let clock = Arc::clone(&self.clock);
        let timers = Arc::clone(&self.timers);
        // Spawned while holding the entry, so the timer's own removal can
        // never run before its handle is stored.
        match self.timers.entry(task.id()) {
            Entry::Occupied(_) => {
                error!(task_id = task.id(), "duplicate timer for task id");
            }
            Entry::Vacant(slot) => {
                let timer = self.handle.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                    if job.is_periodic() {
                        let mut interval = tokio::time::interval(Duration::from_millis(job.period() as u64));
                        loop {
                            interval.tick().await;
                            if !run_timed(&job, &registry, &metrics).await {
                                break;
                            }
                            job.set_next_run(clock.now_millis().saturating_add(job.period()));
                        }
                    } else {
                        run_timed(&job, &registry, &metrics).await;
                    }
                    timers.remove(&job.id());
                });
                slot.insert(timer.abort_handle());
            }
        }
        task
    }

    /// Stop the timers of tasks flipped to cancelled.
    fn abort_timers(&self, flagged: &[Arc<Task>]) {
        for task in flagged.iter().filter(|t| t.is_async()) {
            if let Some((_, timer)) = self.timers.remove(&task.id()) {
                timer.abort();
            }
            self.core.release_cancelled(task);
        }
    }
}

/// Run one timed execution. Returns whether the timer should keep going.
async fn run_timed(
    job: &Arc<Task>,
    registry: &Arc<ActiveRegistry>,
    metrics: &Arc<RwLock<SchedulerMetrics>>,
) -> bool {
    let (task, registry, metrics) = (Arc::clone(job), Arc::clone(registry), Arc::clone(metrics));
    let run = tokio::task::spawn_blocking(move || run_async(&task, &registry, &metrics));
    if let Err(e) = run.await {
        warn!(task_id = job.id(), error = %e, "timer run did not complete");
    }
    job.is_live()
}

impl DomainScheduler for WallClockScheduler {
    fn core(&self) -> &SchedulerCore {
        &self.core
    }

    fn submit(&self, builder: TaskBuilder, start_delay: i64) -> Result<TaskHandle, SchedulerError> {
        let plan = builder.plan(start_delay)?;
        let delay = plan.delay;
        let task = self.core.build_task(plan);
        if task.is_async() {
            Ok(self.schedule_timer(task, delay))
        } else {
            let next_run = self.clock.now_millis().saturating_add(delay);
            Ok(self.core.enqueue(task, next_run))
        }
    }

    /// The tick number is ignored: time comes from the clock.
    ///
    /// Only synchronous work is in the pending queue here; asynchronous tasks
    /// live on their timers from submission on.
    fn tick(&self, _current_tick: i64, with_async: bool) {
        let now = self.clock.now_millis();
        self.core.run_tick(now, with_async, &|task| {
            error!(task_id = task.id(), "asynchronous task in the wall-clock pending queue, dropped");
            if task.force_cancel() {
                self.core.release_cancelled(&task);
            }
        });
    }

    fn cancel(&self, id: TaskId) {
        let flagged = self.core.cancel(id);
        self.abort_timers(&flagged);
    }

    fn cancel_owned_by(&self, owner: &Owner) {
        let flagged = self.core.cancel_owned_by(owner);
        self.abort_timers(&flagged);
    }

    fn cancel_all(&self) {
        let flagged = self.core.cancel_all();
        self.abort_timers(&flagged);
    }
}

impl Drop for WallClockScheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
