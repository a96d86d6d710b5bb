use tracing::trace;

use crate::intake::Submission;

use super::core::{LoopState, SchedulerCore};

impl SchedulerCore {
    /// Move everything visible in the submission queue into the pending queue.
    ///
    /// Control tasks run inline, in submission order, so they see exactly the
    /// work submitted before them. Cancelled submissions are swept.
    pub(super) fn drain(&self, state: &mut LoopState) {
        let mut moved = 0usize;
        let mut swept = 0usize;
        for submission in self.intake.drain_visible() {
            match submission {
                Submission::Control(scope) => self.apply_control(&scope, state),
                Submission::Task(task) => {
                    if task.is_cancelled() {
                        self.release_cancelled(&task);
                        swept += 1;
                        continue;
                    }
                    task.mark_queued();
                    state.pending.push(task);
                    moved += 1;
                }
            }
        }
        self.metrics.write().drain_passes += 1;
        if moved + swept > 0 {
            trace!(domain = %self.domain, moved, swept, pending = state.pending.len(), "drain pass");
        }
    }
}
