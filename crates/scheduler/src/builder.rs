use std::fmt;
use std::sync::Arc;

use tickforge_core::{Owner, SyncContext};

use crate::error::SchedulerError;
use crate::task::TaskFn;
use crate::types::{normalize_period, ExecutionMode, TimeDomain, PERIOD_SINGLE};

/// Describes a task before it is submitted.
///
/// By default a task is synchronous, bound to the runtime's primary context,
/// measured in ticks, and runs once without delay.
///
/// ```ignore
/// let builder = TaskBuilder::new(owner, || { save_world()?; Ok(()) })
///     .name("autosave")
///     .asynchronous()
///     .repeating(6000);
/// scheduler.submit(builder, 100)?;
/// ```
pub struct TaskBuilder {
    owner: Owner,
    name: Option<String>,
    body: Arc<TaskFn>,
    mode: ExecutionMode,
    domain: TimeDomain,
    sync_context: Option<Arc<SyncContext>>,
    single: bool,
    delay: i64,
}

/// Normalized submission parameters.
pub(crate) struct TaskPlan {
    pub owner: Owner,
    pub name: Option<String>,
    pub body: Arc<TaskFn>,
    pub mode: ExecutionMode,
    pub domain: TimeDomain,
    pub sync_context: Option<Arc<SyncContext>>,
    pub delay: i64,
    pub period: i64,
}

impl TaskBuilder {
    pub fn new<F>(owner: Owner, body: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            owner,
            name: None,
            body: Arc::new(body),
            mode: ExecutionMode::Synchronous,
            domain: TimeDomain::TickClock,
            sync_context: None,
            single: true,
            delay: 0,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Run on the worker pool instead of a synchronization context.
    pub fn asynchronous(mut self) -> Self {
        self.mode = ExecutionMode::Asynchronous;
        self.sync_context = None;
        self
    }

    /// Run inline on the thread driving `context`.
    pub fn synchronized_to(mut self, context: Arc<SyncContext>) -> Self {
        self.mode = ExecutionMode::Synchronous;
        self.sync_context = Some(context);
        self
    }

    /// Measure delay and period in milliseconds of real time.
    pub fn real_time(mut self) -> Self {
        self.domain = TimeDomain::WallClock;
        self
    }

    /// Measure delay and period in simulation ticks (the default).
    pub fn game_time(mut self) -> Self {
        self.domain = TimeDomain::TickClock;
        self
    }

    /// Run once, `delay` time units after submission.
    pub fn single(mut self, delay: i64) -> Self {
        self.single = true;
        self.delay = delay;
        self
    }

    /// Repeat every `period` time units. The first run happens after the
    /// start delay given to `submit`.
    pub fn repeating(mut self, period: i64) -> Self {
        self.single = false;
        self.delay = period;
        self
    }

    pub fn domain(&self) -> TimeDomain {
        self.domain
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Validate and normalize against the `submit` start delay.
    pub(crate) fn plan(self, start_delay: i64) -> Result<TaskPlan, SchedulerError> {
        if self.single && start_delay != 0 {
            return Err(SchedulerError::InvalidArgument(
                "single task can't have additional start delay".into(),
            ));
        }
        let (delay, period) = if self.single {
            (self.delay, PERIOD_SINGLE)
        } else {
            (start_delay, self.delay)
        };
        Ok(TaskPlan {
            owner: self.owner,
            name: self.name,
            body: self.body,
            mode: self.mode,
            domain: self.domain,
            sync_context: self.sync_context,
            delay: delay.max(0),
            period: normalize_period(period),
        })
    }
}

impl fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("owner", &self.owner.name())
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("domain", &self.domain)
            .field("single", &self.single)
            .field("delay", &self.delay)
            .finish()
    }
}
