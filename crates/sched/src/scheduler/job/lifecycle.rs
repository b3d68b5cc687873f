use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::scheduler::task::JobError;
use crate::scheduler::types::{FailureReason, StatusUpdate, TaskId, TaskOutcome, TaskStatus};

use super::core::SimpleJob;

impl SimpleJob {
    /// Dispatch a status report. STARTING and RUNNING change nothing.
    pub fn status_update(&mut self, update: StatusUpdate) -> Result<(), JobError> {
        debug!(
            job_id = self.id,
            tid = update.tid,
            status = %update.status,
            reason = ?update.reason,
            "job status update"
        );
        if self.failed {
            if update.status.is_terminal() {
                debug!(job_id = self.id, tid = update.tid, "ignoring status update, job aborted");
            }
            return Ok(());
        }
        match update.status {
            TaskStatus::Finished => self.task_finished(update.tid, update.result, update.update),
            TaskStatus::Lost | TaskStatus::Failed | TaskStatus::Killed => {
                self.task_lost(update.tid, update.status, update.reason)
            }
            TaskStatus::Starting | TaskStatus::Running => Ok(()),
        }
    }

    /// Mark a task finished. Repeated reports for a finished index are ignored.
    pub fn task_finished(
        &mut self,
        tid: TaskId,
        result: Option<Value>,
        update: Option<Value>,
    ) -> Result<(), JobError> {
        let index = self.index_of(tid)?;
        if self.slots[index].finished {
            info!(
                "Ignoring task-finished event for TID {} because task {} is already finished",
                tid, index
            );
            return Ok(());
        }

        let now = self.clock.now();
        let used = self.slots[index]
            .run
            .start
            .map(|start| self.elapsed_since(start, now))
            .unwrap_or_default();
        let slot = &mut self.slots[index];
        slot.finished = true;
        slot.run.used = used;
        self.tasks_finished += 1;
        self.total_used += used;
        self.metrics.record_success(used);
        info!(
            "Task {} finished in {:.2}s ({}/{})",
            tid,
            used.as_secs_f64(),
            self.tasks_finished,
            self.num_tasks()
        );

        self.sched.task_ended(&self.tasks[index], TaskOutcome::Success, result, update);
        self.finish_if_complete();
        Ok(())
    }

    /// Handle a FAILED, LOST or KILLED report.
    ///
    /// Fetch failures finish the task without retry. Anything else puts the
    /// task back into pending; FAILED and LOST count against the retry budget.
    pub fn task_lost(
        &mut self,
        tid: TaskId,
        status: TaskStatus,
        reason: Option<FailureReason>,
    ) -> Result<(), JobError> {
        let index = self.index_of(tid)?;
        if self.slots[index].finished {
            warn!(
                "Ignoring task-lost event for TID {} because task {} is already finished",
                tid, index
            );
            return Ok(());
        }

        warn!(
            "Lost TID {} (task {}:{}) {}",
            tid,
            self.id,
            index,
            reason.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        let slot = &mut self.slots[index];
        if slot.launched {
            slot.launched = false;
            self.tasks_launched -= 1;
        }

        let reason = match reason {
            Some(reason) if reason.is_fetch_failure() => {
                self.fetch_failed(index, reason);
                return Ok(());
            }
            other => other,
        };

        warn!("re-enqueue task {} as pending for a max number of retries", index);
        if status == TaskStatus::Failed {
            warn!(
                "task {} failed with: {}",
                index,
                reason.as_ref().map(ToString::to_string).unwrap_or_else(|| "unknown error".into())
            );
        }
        self.add_pending_task(index);
        self.sched.request_more_resources();

        match status {
            TaskStatus::Failed | TaskStatus::Lost => {
                self.metrics.record_failure();
                let max_failures = self.config.max_task_failures;
                let slot = &mut self.slots[index];
                slot.num_failures += 1;
                if slot.num_failures > max_failures {
                    error!(
                        "Task {} failed more than {} times; aborting job",
                        index, max_failures
                    );
                    self.abort(format!("Task {} failed more than {} times", index, max_failures));
                }
            }
            _ => self.metrics.record_kill(),
        }
        Ok(())
    }

    /// Upstream output is gone. Report it and retire the task; the stage
    /// scheduler decides how to recover.
    fn fetch_failed(&mut self, index: usize, reason: FailureReason) {
        warn!("Loss of task {} was due to {}", index, reason);
        self.metrics.record_fetch_failure();
        self.sched.task_ended(&self.tasks[index], TaskOutcome::from(reason), None, None);
        self.slots[index].finished = true;
        self.tasks_finished += 1;
        self.finish_if_complete();
    }
}
