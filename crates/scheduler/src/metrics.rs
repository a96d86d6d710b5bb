use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::types::TimeDomain;

/// Per time-domain scheduler counters, exposed for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    pub domain: TimeDomain,
    /// Completed task bodies by owner.
    pub tasks_executed: HashMap<String, u64>,
    /// Task bodies that returned an error or panicked, by owner.
    pub tasks_failed: HashMap<String, u64>,
    /// Tasks dropped by cancellation, by owner.
    pub tasks_cancelled: HashMap<String, u64>,
    /// Asynchronous bodies handed to the worker pool.
    pub tasks_dispatched: u64,
    /// Average body duration by owner.
    pub avg_task_duration: HashMap<String, Duration>,
    /// Number of drain passes performed.
    pub drain_passes: u64,
    /// Time observed by the last tick (tick number or epoch millis).
    pub last_tick: i64,
}

impl SchedulerMetrics {
    pub fn new(domain: TimeDomain) -> Self {
        Self {
            domain,
            tasks_executed: HashMap::new(),
            tasks_failed: HashMap::new(),
            tasks_cancelled: HashMap::new(),
            tasks_dispatched: 0,
            avg_task_duration: HashMap::new(),
            drain_passes: 0,
            last_tick: -1,
        }
    }

    /// Record a task body execution for `owner`.
    pub fn record_execution(&mut self, owner: &str, duration: Duration) {
        *self.tasks_executed.entry(owner.to_string()).or_default() += 1;

        // Update rolling average duration
        let count = self.tasks_executed[owner];
        let prev_avg = self
            .avg_task_duration
            .get(owner)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(owner.to_string(), new_avg);
    }

    pub fn record_failure(&mut self, owner: &str) {
        *self.tasks_failed.entry(owner.to_string()).or_default() += 1;
    }

    pub fn record_cancellation(&mut self, owner: &str) {
        *self.tasks_cancelled.entry(owner.to_string()).or_default() += 1;
    }

    pub fn total_executed(&self) -> u64 {
        self.tasks_executed.values().sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.tasks_failed.values().sum()
    }
}
