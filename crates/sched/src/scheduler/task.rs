use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{JobReport, TaskId, TaskOutcome};

/// Error type for job operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unknown task id: {0}")]
    UnknownTask(TaskId),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// A unit of work the job places on hosts.
///
/// Execution, serialization and result transport belong to the task; the job
/// only needs its identity and where it would like to run.
pub trait Task: Send + Sync {
    /// Runtime identifier, reported back in status updates.
    fn id(&self) -> TaskId;

    /// Hosts holding this task's input. Empty means any host will do.
    fn preferred_locations(&self) -> Vec<String>;
}

/// The cluster scheduler a job reports back to.
pub trait TaskScheduler: Send + Sync {
    /// One task reached a terminal outcome.
    fn task_ended(
        &self,
        task: &Arc<dyn Task>,
        outcome: TaskOutcome,
        result: Option<Value>,
        update: Option<Value>,
    );

    /// The job finished, successfully or not. Called once per job.
    fn job_finished(&self, report: &JobReport);

    /// A slot was freed unexpectedly and more offers are wanted.
    fn request_more_resources(&self);

    /// Tear the scheduler down. Only sent on abort.
    fn shutdown(&self);
}

/// Scheduling metadata of one task index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRun {
    /// Start of the latest attempt.
    pub start: Option<DateTime<Utc>>,
    /// Speculative relaunches since the last fresh launch.
    pub tried: u32,
    /// Measured duration, set when the task finishes.
    pub used: Duration,
    /// Host of the latest fresh launch.
    pub host: Option<String>,
}
