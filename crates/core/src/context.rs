//! Synchronization contexts: logical threads that synchronous work is pinned to.

use std::thread::{self, ThreadId};

use parking_lot::RwLock;

/// A logical execution context such as "the main simulation thread".
///
/// The runtime driver calls [`enter`](SyncContext::enter) at the start of every
/// tick it drives. Synchronous tasks bound to this context are only eligible
/// to run on the thread that entered it last.
#[derive(Debug)]
pub struct SyncContext {
    name: String,
    last_tick_thread: RwLock<Option<ThreadId>>,
}

impl SyncContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_tick_thread: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the calling thread as the one currently driving this context.
    pub fn enter(&self) {
        let current = thread::current().id();
        let mut last = self.last_tick_thread.write();
        if *last != Some(current) {
            tracing::debug!(context = %self.name, thread = ?current, "sync context moved to new thread");
            *last = Some(current);
        }
    }

    /// Thread that most recently entered this context, if any.
    pub fn last_tick_thread(&self) -> Option<ThreadId> {
        *self.last_tick_thread.read()
    }

    /// Whether `thread` is the last observed driver of this context.
    pub fn is_driven_by(&self, thread: ThreadId) -> bool {
        self.last_tick_thread() == Some(thread)
    }

    /// Whether the calling thread is the last observed driver of this context.
    pub fn is_current(&self) -> bool {
        self.is_driven_by(thread::current().id())
    }
}
