use std::sync::Arc;

use tracing::debug;

use tickforge_core::Owner;

use crate::intake::{CancelScope, Submission};
use crate::task::Task;
use crate::types::{is_external_id, TaskId};

use super::core::{LoopState, SchedulerCore};

impl SchedulerCore {
    /// Cancel one task. Fire-and-forget: fully applied by the next drain.
    ///
    /// Returns the tasks this call flipped to cancelled.
    pub fn cancel(&self, id: TaskId) -> Vec<Arc<Task>> {
        if !is_external_id(id) {
            return Vec::new();
        }
        self.submit_control(CancelScope::Task(id))
    }

    /// Cancel every task of `owner`, including async bodies still running,
    /// which finish their current run and are not rescheduled.
    pub fn cancel_owned_by(&self, owner: &Owner) -> Vec<Arc<Task>> {
        self.submit_control(CancelScope::Owner(owner.clone()))
    }

    pub fn cancel_all(&self) -> Vec<Arc<Task>> {
        self.submit_control(CancelScope::All)
    }

    /// Flag everything already known, then append the control task.
    ///
    /// The registry holds every task from submission onwards, so flagging it
    /// covers undrained, queued and running work submitted before this call.
    /// The control task then pulls the flagged work out of the pending queue
    /// when the drain reaches it.
    fn submit_control(&self, scope: CancelScope) -> Vec<Arc<Task>> {
        let flagged: Vec<Arc<Task>> = self
            .registry
            .matching(|t| scope.matches(t))
            .into_iter()
            .filter(|t| t.force_cancel())
            .collect();
        debug!(domain = %self.domain, scope = ?scope, flagged = flagged.len(), "cancellation requested");
        self.intake.append(Submission::Control(scope));
        flagged
    }

    /// Body of a control task, run inline by the drain pass.
    pub(super) fn apply_control(&self, scope: &CancelScope, state: &mut LoopState) {
        let mut swept = state.pending.extract_if(|t| scope.matches(t));
        state.held.retain(|t| {
            if scope.matches(t) {
                swept.push(Arc::clone(t));
                false
            } else {
                true
            }
        });
        for task in &swept {
            task.force_cancel();
            self.release_cancelled(task);
        }
        debug!(domain = %self.domain, scope = ?scope, swept = swept.len(), "control task applied");
    }
}
