use std::sync::{Arc, Mutex};

use super::job::SimpleJob;
use super::task::JobError;

/// Thread-safe handle to one job.
///
/// Offers and status updates mutate several counters and indexes together, so
/// every call for a job goes through the same lock.
pub type SharedJob = Arc<Mutex<SimpleJob>>;

/// Wrap a job for use from several threads.
pub fn new_shared_job(job: SimpleJob) -> SharedJob {
    Arc::new(Mutex::new(job))
}

/// Run `f` with exclusive access to the job.
pub fn with_job<R>(job: &SharedJob, f: impl FnOnce(&mut SimpleJob) -> R) -> Result<R, JobError> {
    let mut guard = job
        .lock()
        .map_err(|e| JobError::LockPoisoned(format!("SimpleJob lock: {}", e)))?;
    Ok(f(&mut *guard))
}
