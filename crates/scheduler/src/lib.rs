//! Dual time-domain task scheduler for a multiplayer game-server runtime.
//!
//! Work is accepted from any thread through a lock-free submission queue and
//! executed by two independent domains: simulation ticks and wall-clock
//! milliseconds. Synchronous tasks run inline on the thread driving their
//! [`SyncContext`]; asynchronous tasks run on worker pools.

pub mod builder;
pub mod clock;
pub mod composite;
pub mod domain;
pub mod error;
pub mod future;
pub mod metrics;
pub mod task;
pub mod types;

mod intake;
mod pending;
mod registry;

pub use builder::TaskBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use composite::{CompositeMetrics, Scheduler};
pub use domain::{DomainScheduler, SchedulerCore, TickClockScheduler, WallClockScheduler};
pub use error::{CallError, SchedulerError};
pub use future::CallFuture;
pub use metrics::SchedulerMetrics;
pub use task::{Task, TaskHandle, TaskState, WorkerInfo};
pub use types::{ExecutionMode, SchedulerConfig, TaskId, TimeDomain, PERIOD_SINGLE};

pub use tickforge_core::{Owner, SyncContext};
