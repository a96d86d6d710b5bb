use std::time::Duration;

use thiserror::Error;

use tickforge_core::CoreError;

/// Errors reported synchronously by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("timer runtime error: {0}")]
    TimerRuntime(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Outcome delivered to the waiter of a [`CallFuture`](crate::CallFuture)
/// when no value is available.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call was cancelled before it started")]
    Cancelled,

    #[error("call did not complete within {0:?}")]
    Timeout(Duration),

    #[error("call failed: {0}")]
    Failed(anyhow::Error),

    #[error("call panicked: {0}")]
    Panicked(String),

    #[error("call result was already taken")]
    Consumed,
}
