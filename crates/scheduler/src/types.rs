use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tickforge_core::config;

use crate::error::SchedulerError;

/// Task identifier. External ids are strictly positive; `<= 0` is reserved.
pub type TaskId = i64;

/// Period value for tasks that run once and retire.
pub const PERIOD_SINGLE: i64 = -1;

/// Whether `id` can name an externally submitted task.
pub fn is_external_id(id: TaskId) -> bool {
    id > 0
}

/// Normalize a requested repeat period.
///
/// `0` becomes the minimum interval `1`; anything below `-1` collapses to a
/// one-shot.
pub fn normalize_period(period: i64) -> i64 {
    match period {
        0 => 1,
        p if p < PERIOD_SINGLE => PERIOD_SINGLE,
        p => p,
    }
}

/// Where a task body executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Inline on the thread driving the task's synchronization context.
    Synchronous,
    /// On the time domain's worker pool.
    Asynchronous,
}

/// Clock a task's delay and period are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeDomain {
    /// Simulation ticks, advanced by the runtime driver.
    TickClock,
    /// Milliseconds of real elapsed time.
    WallClock,
}

impl std::fmt::Display for TimeDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeDomain::TickClock => write!(f, "tick-clock"),
            TimeDomain::WallClock => write!(f, "wall-clock"),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Ceiling on tick-clock async worker threads. Workers are spawned on
    /// demand and reused, this only bounds a runaway burst.
    #[serde(default = "default_max_async_workers")]
    pub max_async_workers: usize,
    /// Idle time after which a cached async worker thread exits.
    #[serde(default = "default_async_worker_keep_alive_ms")]
    pub async_worker_keep_alive_ms: u64,
    /// Wall-clock timer threads.
    #[serde(default = "default_timer_threads")]
    pub timer_threads: usize,
    /// Thread name prefix for tick-clock workers.
    #[serde(default = "default_worker_thread_prefix")]
    pub worker_thread_prefix: String,
    /// Thread name prefix for wall-clock timers.
    #[serde(default = "default_timer_thread_prefix")]
    pub timer_thread_prefix: String,
    /// Initial capacity of each pending queue.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Initial capacity of the per-tick reschedule list.
    #[serde(default = "default_reschedule_capacity")]
    pub reschedule_capacity: usize,
}

fn default_max_async_workers() -> usize { 512 }
fn default_async_worker_keep_alive_ms() -> u64 { 60_000 }
fn default_timer_threads() -> usize { 2 }
fn default_worker_thread_prefix() -> String { "task-worker".into() }
fn default_timer_thread_prefix() -> String { "task-timer".into() }
fn default_pending_capacity() -> usize { 64 }
fn default_reschedule_capacity() -> usize { 100 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_async_workers: default_max_async_workers(),
            async_worker_keep_alive_ms: default_async_worker_keep_alive_ms(),
            timer_threads: default_timer_threads(),
            worker_thread_prefix: default_worker_thread_prefix(),
            timer_thread_prefix: default_timer_thread_prefix(),
            pending_capacity: default_pending_capacity(),
            reschedule_capacity: default_reschedule_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides(&config::active_profile());
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SchedulerError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&content)
    }

    /// Defaults overlaid with environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, SchedulerError> {
        let mut config = Self::default();
        config.apply_env_overrides(&config::active_profile());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, profile: &str) {
        self.max_async_workers =
            config::profiled_env_parse(profile, "TICKFORGE_MAX_ASYNC_WORKERS", self.max_async_workers);
        self.async_worker_keep_alive_ms = config::profiled_env_parse(
            profile,
            "TICKFORGE_ASYNC_KEEP_ALIVE_MS",
            self.async_worker_keep_alive_ms,
        );
        self.timer_threads =
            config::profiled_env_parse(profile, "TICKFORGE_TIMER_THREADS", self.timer_threads);
        if let Some(v) = config::profiled_env_opt(profile, "TICKFORGE_WORKER_PREFIX") {
            self.worker_thread_prefix = v;
        }
        if let Some(v) = config::profiled_env_opt(profile, "TICKFORGE_TIMER_PREFIX") {
            self.timer_thread_prefix = v;
        }
    }

    /// Reject configurations the scheduler cannot start with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.timer_threads == 0 {
            return Err(SchedulerError::Config("timer_threads must be at least 1".into()));
        }
        if self.max_async_workers == 0 {
            return Err(SchedulerError::Config("max_async_workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn async_worker_keep_alive(&self) -> Duration {
        Duration::from_millis(self.async_worker_keep_alive_ms)
    }
}
