use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tracing::info;

use tickforge_core::SyncContext;

use crate::builder::TaskBuilder;
use crate::error::SchedulerError;
use crate::task::TaskHandle;
use crate::types::{SchedulerConfig, TimeDomain};

use super::execution::run_async;
use super::{named_runtime, DomainScheduler, SchedulerCore};

/// Scheduler measured in simulation ticks.
///
/// Async bodies go to a cached worker pool, a fresh dispatch per due run.
/// Each body gets its own thread for as long as it runs, so bodies may block
/// on I/O or on each other without starving later work.
pub struct TickClockScheduler {
    core: SchedulerCore,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl TickClockScheduler {
    pub fn new(
        config: &SchedulerConfig,
        ids: Arc<AtomicI64>,
        main_context: Arc<SyncContext>,
    ) -> Result<Self, SchedulerError> {
        // One core thread; all task bodies run on the blocking pool.
        let runtime = named_runtime(
            &config.worker_thread_prefix,
            1,
            config.max_async_workers,
            config.async_worker_keep_alive(),
        )?;
        let handle = runtime.handle().clone();
        info!(
            "Tick-clock scheduler starting with a cached async pool (max {} workers, keep-alive {:?})",
            config.max_async_workers,
            config.async_worker_keep_alive()
        );

        Ok(Self {
            // No tick observed yet: zero-delay work becomes due on the first tick.
            core: SchedulerCore::new(TimeDomain::TickClock, ids, main_context, config, -1),
            runtime: Some(runtime),
            handle,
        })
    }
}

impl DomainScheduler for TickClockScheduler {
    fn core(&self) -> &SchedulerCore {
        &self.core
    }

    fn submit(&self, builder: TaskBuilder, start_delay: i64) -> Result<TaskHandle, SchedulerError> {
        let plan = builder.plan(start_delay)?;
        let next_run = self.core.now().saturating_add(plan.delay);
        let task = self.core.build_task(plan);
        Ok(self.core.enqueue(task, next_run))
    }

    fn tick(&self, current_tick: i64, with_async: bool) {
        self.core.run_tick(current_tick, with_async, &|task| {
            let registry = Arc::clone(&self.core.registry);
            let metrics = Arc::clone(&self.core.metrics);
            self.handle.spawn_blocking(move || run_async(&task, &registry, &metrics));
        });
    }
}

impl Drop for TickClockScheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
