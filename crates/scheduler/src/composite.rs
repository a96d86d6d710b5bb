use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use tickforge_core::{Owner, SyncContext};

use crate::builder::TaskBuilder;
use crate::clock::{Clock, SystemClock};
use crate::domain::{DomainScheduler, TickClockScheduler, WallClockScheduler};
use crate::error::SchedulerError;
use crate::future::CallFuture;
use crate::metrics::SchedulerMetrics;
use crate::task::{TaskHandle, WorkerInfo};
use crate::types::{SchedulerConfig, TaskId, TimeDomain};

/// Metrics of both time domains.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeMetrics {
    pub tick_clock: SchedulerMetrics,
    pub wall_clock: SchedulerMetrics,
}

/// The runtime's scheduler: one tick-clock and one wall-clock domain behind a
/// single API. Submissions are routed by the builder's time domain; every
/// other operation fans out to both domains.
///
/// Submission, cancellation and queries may be called from any thread.
/// [`tick`](Scheduler::tick) is driven by the runtime's main loop.
pub struct Scheduler {
    main_context: Arc<SyncContext>,
    tick_clock: TickClockScheduler,
    wall_clock: WallClockScheduler,
}

impl Scheduler {
    /// Create a scheduler using real time for the wall-clock domain.
    pub fn new(config: SchedulerConfig, main_context: Arc<SyncContext>) -> Result<Self, SchedulerError> {
        Self::with_clock(config, main_context, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SchedulerConfig,
        main_context: Arc<SyncContext>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let ids = Arc::new(AtomicI64::new(1));
        let tick_clock = TickClockScheduler::new(&config, Arc::clone(&ids), Arc::clone(&main_context))?;
        let wall_clock = WallClockScheduler::new(&config, ids, Arc::clone(&main_context), clock)?;
        info!("Scheduler ready (primary context: {})", main_context.name());
        Ok(Self {
            main_context,
            tick_clock,
            wall_clock,
        })
    }

    fn domain(&self, domain: TimeDomain) -> &dyn DomainScheduler {
        match domain {
            TimeDomain::TickClock => &self.tick_clock,
            TimeDomain::WallClock => &self.wall_clock,
        }
    }

    fn domains(&self) -> [&dyn DomainScheduler; 2] {
        [&self.tick_clock as &dyn DomainScheduler, &self.wall_clock]
    }

    /// The runtime's primary synchronization context.
    pub fn main_context(&self) -> &Arc<SyncContext> {
        &self.main_context
    }

    pub fn tick_clock(&self) -> &TickClockScheduler {
        &self.tick_clock
    }

    pub fn wall_clock(&self) -> &WallClockScheduler {
        &self.wall_clock
    }

    /// Submit a task to the domain its builder asks for.
    ///
    /// Fails with [`SchedulerError::InvalidArgument`] when a single task is
    /// given a nonzero `start_delay`.
    pub fn submit(&self, builder: TaskBuilder, start_delay: i64) -> Result<TaskHandle, SchedulerError> {
        self.domain(builder.domain()).submit(builder, start_delay)
    }

    /// Submit with no start delay.
    pub fn run_task(&self, builder: TaskBuilder) -> Result<TaskHandle, SchedulerError> {
        self.submit(builder, 0)
    }

    /// Run `computation` once on `context` (the primary context if `None`) at
    /// the next tick driven from that context's thread.
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
        self.tick_clock.core().call_on_context(owner, computation, context)
    }

    pub fn call_on_main<T, F>(&self, owner: Owner, computation: F) -> CallFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.call_on_context(owner, computation, None)
    }

    /// Cancel task `id`. Takes full effect at the next drain of its domain.
    pub fn cancel(&self, id: TaskId) {
        for domain in self.domains() {
            domain.cancel(id);
        }
    }

    pub fn cancel_all_owned_by(&self, owner: &Owner) {
        for domain in self.domains() {
            domain.cancel_owned_by(owner);
        }
    }

    pub fn cancel_all(&self) {
        for domain in self.domains() {
            domain.cancel_all();
        }
    }

    /// Point-in-time answer; may be stale as soon as it returns.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.domains().iter().any(|d| d.core().is_running(id))
    }

    /// Point-in-time answer; may be stale as soon as it returns.
    pub fn is_queued(&self, id: TaskId) -> bool {
        self.domains().iter().any(|d| d.core().is_queued(id))
    }

    pub fn active_workers(&self) -> Vec<WorkerInfo> {
        self.domains()
            .iter()
            .flat_map(|d| d.core().active_workers())
            .collect()
    }

    pub fn pending_tasks(&self) -> Vec<TaskHandle> {
        self.domains()
            .iter()
            .flat_map(|d| d.core().pending_tasks())
            .collect()
    }

    /// Advance both domains. `with_async = false` marks a partial pass that
    /// only runs synchronous work.
    pub fn tick(&self, current_tick: i64, with_async: bool) {
        for domain in self.domains() {
            domain.tick(current_tick, with_async);
        }
    }

    pub fn metrics(&self) -> CompositeMetrics {
        CompositeMetrics {
            tick_clock: self.tick_clock.core().metrics(),
            wall_clock: self.wall_clock.core().metrics(),
        }
    }

    /// Cancel everything. Running bodies finish their current run.
    pub fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.cancel_all();
    }
}
