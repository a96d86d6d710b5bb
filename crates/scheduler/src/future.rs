//! Synchronous call futures: run a computation on a chosen synchronization
//! context and hand its outcome back to the submitting thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::CallError;
use crate::task::{CallCell, TaskHandle};
use crate::types::TaskId;

type Computation<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

enum Outcome<T> {
    Value(T),
    Failed(anyhow::Error),
    Panicked(String),
    Cancelled,
    Taken,
}

/// Shared between the scheduled task and the waiting handle.
pub(crate) struct CallSlot<T> {
    computation: Mutex<Option<Computation<T>>>,
    outcome: Mutex<Option<Outcome<T>>>,
    ready: Condvar,
}

impl<T: Send + 'static> CallSlot<T> {
    pub(crate) fn new<F>(computation: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            computation: Mutex::new(Some(Box::new(computation))),
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// First outcome wins; later ones are dropped.
    fn complete(&self, outcome: Outcome<T>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.ready.notify_all();
        }
    }
}

impl<T: Send + 'static> CallCell for CallSlot<T> {
    fn execute(&self) {
        let Some(computation) = self.computation.lock().take() else {
            return;
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(computation)) {
            Ok(Ok(value)) => Outcome::Value(value),
            Ok(Err(e)) => Outcome::Failed(e),
            Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
        };
        self.complete(outcome);
    }

    fn abandon(&self) {
        self.computation.lock().take();
        self.complete(Outcome::Cancelled);
    }
}

/// Render a panic payload for logs and error values.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a computation scheduled on a synchronization context.
///
/// Exactly one of value, failure, or cancellation is delivered. The
/// scheduler thread never waits on this handle.
pub struct CallFuture<T> {
    task: TaskHandle,
    slot: Arc<CallSlot<T>>,
}

impl<T: Send + 'static> CallFuture<T> {
    pub(crate) fn new(task: TaskHandle, slot: Arc<CallSlot<T>>) -> Self {
        Self { task, slot }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Whether an outcome has been published.
    pub fn is_done(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot.outcome.lock(), Some(Outcome::Cancelled))
    }

    /// Cancel the call if it has not started. Returns `false` when the
    /// computation already started or finished; its result is then still
    /// delivered.
    pub fn cancel(&self) -> bool {
        self.task.cancel_unstarted()
    }

    /// Block until the outcome is available.
    pub fn wait(&mut self) -> Result<T, CallError> {
        let mut slot = self.slot.outcome.lock();
        while slot.is_none() {
            self.slot.ready.wait(&mut slot);
        }
        Self::take(&mut slot)
    }

    /// Block for at most `timeout`. On [`CallError::Timeout`] the call stays
    /// scheduled and may be waited on again.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<T, CallError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.outcome.lock();
        while slot.is_none() {
            if self.slot.ready.wait_until(&mut slot, deadline).timed_out() && slot.is_none() {
                return Err(CallError::Timeout(timeout));
            }
        }
        Self::take(&mut slot)
    }

    /// Non-blocking: `None` while the call is still pending.
    pub fn try_take(&mut self) -> Option<Result<T, CallError>> {
        let mut slot = self.slot.outcome.lock();
        if slot.is_none() {
            return None;
        }
        Some(Self::take(&mut slot))
    }

    fn take(slot: &mut Option<Outcome<T>>) -> Result<T, CallError> {
        match slot.replace(Outcome::Taken) {
            Some(Outcome::Value(value)) => Ok(value),
            Some(Outcome::Failed(e)) => Err(CallError::Failed(e)),
            Some(Outcome::Panicked(msg)) => Err(CallError::Panicked(msg)),
            Some(Outcome::Cancelled) => {
                *slot = Some(Outcome::Cancelled);
                Err(CallError::Cancelled)
            }
            Some(Outcome::Taken) | None => Err(CallError::Consumed),
        }
    }
}

impl<T> std::fmt::Debug for CallFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFuture").field("task", &self.task).finish()
    }
}
