use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::Task;

/// Runtime identifier of a launched task.
pub type TaskId = u64;

/// Identifier of a job, unique for the lifetime of the allocator that issued it.
pub type JobId = u64;

/// Hands out job ids. Owned by the surrounding scheduler and shared between
/// every job it creates.
#[derive(Debug)]
pub struct JobIdAllocator {
    next: AtomicU64,
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl JobIdAllocator {
    /// First id issued is 1.
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> JobId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Task state as reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskStatus {
    /// Map a numeric wire code (0..=5) to a status.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Starting),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Finished),
            3 => Some(TaskStatus::Failed),
            4 => Some(TaskStatus::Killed),
            5 => Some(TaskStatus::Lost),
            _ => None,
        }
    }

    /// Whether the status ends the attempt it reports on.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Starting | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Starting => write!(f, "starting"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Finished => write!(f, "finished"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Killed => write!(f, "killed"),
            TaskStatus::Lost => write!(f, "lost"),
        }
    }
}

/// Why an attempt ended unsuccessfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Upstream shuffle output could not be fetched. Not retried by the job.
    FetchFailed {
        server_uri: String,
        shuffle_id: u64,
        map_id: u64,
        reduce_id: u64,
    },
    /// Any other error raised by the task.
    Error { message: String },
}

impl FailureReason {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, FailureReason::FetchFailed { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::FetchFailed { server_uri, shuffle_id, map_id, reduce_id } => write!(
                f,
                "fetch failed from {server_uri} (shuffle {shuffle_id}, map {map_id}, reduce {reduce_id})"
            ),
            FailureReason::Error { message } => write!(f, "{message}"),
        }
    }
}

/// Terminal outcome of one task, reported to the cluster scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Success,
    FetchFailure {
        server_uri: String,
        shuffle_id: u64,
        map_id: u64,
        reduce_id: u64,
    },
    OtherFailure { reason: String },
}

impl From<FailureReason> for TaskOutcome {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::FetchFailed { server_uri, shuffle_id, map_id, reduce_id } => {
                TaskOutcome::FetchFailure { server_uri, shuffle_id, map_id, reduce_id }
            }
            FailureReason::Error { message } => TaskOutcome::OtherFailure { reason: message },
        }
    }
}

/// How an offer was matched to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locality {
    /// The task prefers the offered host, or has no preference at all.
    Preferred,
    /// Fallback placement after the locality wait elapsed.
    NonPreferred,
    /// Duplicate attempt of a straggling task.
    Speculative,
}

impl Locality {
    /// Whether the launch restarts the locality-wait window.
    pub fn is_preferred(&self) -> bool {
        matches!(self, Locality::Preferred)
    }
}

/// A task chosen for an offer.
#[derive(Clone)]
pub struct TaskLaunch {
    pub task: Arc<dyn Task>,
    /// Position of the task in the job.
    pub index: usize,
    /// Attempt counter after this launch (0 on a fresh launch).
    pub attempt: u32,
    pub locality: Locality,
}

impl TaskLaunch {
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }
}

impl fmt::Debug for TaskLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLaunch")
            .field("tid", &self.task.id())
            .field("index", &self.index)
            .field("attempt", &self.attempt)
            .field("locality", &self.locality)
            .finish()
    }
}

/// A status report for one launched task.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub tid: TaskId,
    pub status: TaskStatus,
    pub reason: Option<FailureReason>,
    /// Task result, passed through to the cluster scheduler untouched.
    pub result: Option<Value>,
    /// Accumulator updates, passed through untouched.
    pub update: Option<Value>,
}

impl StatusUpdate {
    pub fn new(tid: TaskId, status: TaskStatus) -> Self {
        Self { tid, status, reason: None, result: None, update: None }
    }

    pub fn finished(tid: TaskId) -> Self {
        Self::new(tid, TaskStatus::Finished)
    }

    pub fn failed(tid: TaskId, reason: FailureReason) -> Self {
        Self::new(tid, TaskStatus::Failed).with_reason(reason)
    }

    pub fn lost(tid: TaskId) -> Self {
        Self::new(tid, TaskStatus::Lost)
    }

    pub fn killed(tid: TaskId) -> Self {
        Self::new(tid, TaskStatus::Killed)
    }

    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_update(mut self, update: Value) -> Self {
        self.update = Some(update);
        self
    }
}

/// Terminal state of a job, handed to the cluster scheduler once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub failed: bool,
    pub cause_of_failure: Option<String>,
    pub tasks_finished: usize,
    pub num_tasks: usize,
    /// Wall time from job creation to the terminal event.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_increase_from_one() {
        let ids = JobIdAllocator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn job_ids_unique_across_threads() {
        let ids = Arc::new(JobIdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ids = Arc::clone(&ids);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| ids.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<JobId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn status_codes() {
        assert_eq!(TaskStatus::from_code(0), Some(TaskStatus::Starting));
        assert_eq!(TaskStatus::from_code(2), Some(TaskStatus::Finished));
        assert_eq!(TaskStatus::from_code(5), Some(TaskStatus::Lost));
        assert_eq!(TaskStatus::from_code(6), None);
        assert_eq!(TaskStatus::from_code(-1), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Starting.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Finished.is_terminal());
        assert!(TaskStatus::Killed.is_terminal());
        assert_eq!(TaskStatus::Lost.to_string(), "lost");
    }

    #[test]
    fn fetch_failure_maps_to_outcome() {
        let reason = FailureReason::FetchFailed {
            server_uri: "http://node3:5055".into(),
            shuffle_id: 1,
            map_id: 7,
            reduce_id: 2,
        };
        assert!(reason.is_fetch_failure());
        assert_eq!(
            TaskOutcome::from(reason),
            TaskOutcome::FetchFailure {
                server_uri: "http://node3:5055".into(),
                shuffle_id: 1,
                map_id: 7,
                reduce_id: 2,
            }
        );
    }

    #[test]
    fn error_reason_maps_to_other_failure() {
        let reason = FailureReason::Error { message: "boom".into() };
        assert!(!reason.is_fetch_failure());
        assert_eq!(reason.to_string(), "boom");
        assert_eq!(
            TaskOutcome::from(reason),
            TaskOutcome::OtherFailure { reason: "boom".into() }
        );
    }

    #[test]
    fn status_update_builders() {
        let u = StatusUpdate::finished(9).with_result(serde_json::json!({"rows": 3}));
        assert_eq!(u.status, TaskStatus::Finished);
        assert_eq!(u.result, Some(serde_json::json!({"rows": 3})));
        assert!(u.reason.is_none());

        let u = StatusUpdate::failed(9, FailureReason::Error { message: "x".into() });
        assert_eq!(u.status, TaskStatus::Failed);
        assert!(u.reason.is_some());
    }
}
