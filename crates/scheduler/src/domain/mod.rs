//! Per time-domain schedulers.
//!
//! Split into focused submodules:
//! - `core`: shared state (intake, pending queue, registry), submission and queries
//! - `drain`: moving submissions into the pending queue
//! - `cancel`: cancellation control tasks
//! - `execution`: the tick loop, inline execution and worker bodies
//! - `tick_clock` / `wall_clock`: the two concrete time domains

mod cancel;
mod core;
mod drain;
mod execution;
mod tick_clock;
mod wall_clock;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;

use tickforge_core::Owner;

use crate::builder::TaskBuilder;
use crate::error::SchedulerError;
use crate::task::TaskHandle;
use crate::types::{TaskId, TimeDomain};

pub use self::core::SchedulerCore;
pub use self::tick_clock::TickClockScheduler;
pub use self::wall_clock::WallClockScheduler;

/// What differs between time domains: how work is accepted, how a tick
/// advances time and dispatches async bodies, and how cancellation reaches
/// work outside the pending queue.
pub trait DomainScheduler: Send + Sync {
    fn core(&self) -> &SchedulerCore;

    /// Validate, normalize and enqueue a task.
    fn submit(&self, builder: TaskBuilder, start_delay: i64) -> Result<TaskHandle, SchedulerError>;

    /// Drain, run everything ready, reschedule. Not reentrant.
    fn tick(&self, current_tick: i64, with_async: bool);

    fn cancel(&self, id: TaskId) {
        self.core().cancel(id);
    }

    fn cancel_owned_by(&self, owner: &Owner) {
        self.core().cancel_owned_by(owner);
    }

    fn cancel_all(&self) {
        self.core().cancel_all();
    }

    fn domain(&self) -> TimeDomain {
        self.core().domain()
    }
}

/// A multi-thread tokio runtime whose threads are named `{prefix}-{n}`.
///
/// Blocking work goes to the runtime's cached pool: threads are spawned on
/// demand, reused while busy work keeps arriving, and exit after `keep_alive`
/// of idleness.
pub(super) fn named_runtime(
    prefix: &str,
    worker_threads: usize,
    max_blocking_threads: usize,
    keep_alive: Duration,
) -> std::io::Result<Runtime> {
    let prefix = prefix.to_string();
    let counter = Arc::new(AtomicUsize::new(0));
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(max_blocking_threads)
        .thread_keep_alive(keep_alive)
        .thread_name_fn(move || format!("{}-{}", prefix, counter.fetch_add(1, Ordering::Relaxed)))
        .enable_time()
        .build()
}
