//! Per-key job state.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{JobError, pool::TaskHandle};

/// Lifecycle of the job computing one artifact.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    /// Never launched.
    #[default]
    NotStarted,
    /// Running on the worker pool.
    InProgress,
    /// Last run succeeded.
    Done,
    /// Last run failed.
    Failed,
}

/// Status and in-flight handle of one key's job.
///
/// At most one handle is held at a time. Only the manager's control point
/// mutates a `Job`.
pub struct Job<T> {
    status: JobStatus,
    handle: Option<TaskHandle<T>>,
    error: Option<String>,
}

impl<T> Default for Job<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Job<T> {
    /// A job that has never run.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: JobStatus::NotStarted,
            handle: None,
            error: None,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Message of the last failure, cleared when the job is relaunched.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::InProgress)
    }

    /// Records a newly submitted run.
    ///
    /// Callers check [`Job::is_running`] first; a handle that is still in
    /// flight is never replaced.
    pub fn start(&mut self, handle: TaskHandle<T>) {
        debug_assert!(!self.is_running());
        self.status = JobStatus::InProgress;
        self.handle = Some(handle);
        self.error = None;
    }

    /// Resolves when the in-flight run finishes, if there is one.
    pub fn finished(&self) -> Option<impl Future<Output = ()> + Send + use<T>> {
        self.handle.as_ref().map(TaskHandle::finished)
    }

    /// Collects the result of a finished run and updates the status.
    ///
    /// Returns `None` if nothing is in flight or the run has not finished.
    pub fn harvest(&mut self) -> Option<Result<T, JobError>> {
        let result = self.handle.as_ref()?.try_take()?;
        self.handle = None;
        match &result {
            Ok(_) => self.status = JobStatus::Done,
            Err(e) => {
                self.status = JobStatus::Failed;
                self.error = Some(e.to_string());
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerPool;

    #[test]
    fn status_names() {
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_string(&JobStatus::NotStarted).unwrap(),
            "\"not_started\""
        );
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
    }

    #[test]
    fn new_job_has_nothing_to_harvest() {
        let mut job: Job<()> = Job::new();
        assert_eq!(job.status(), JobStatus::NotStarted);
        assert!(!job.is_running());
        assert!(job.finished().is_none());
        assert!(job.harvest().is_none());
    }

    #[tokio::test]
    async fn success_moves_to_done() {
        let pool = WorkerPool::new(1);
        let mut job = Job::new();
        job.start(pool.submit(|| Ok(7)));
        assert_eq!(job.status(), JobStatus::InProgress);

        job.finished().unwrap().await;
        assert_eq!(job.harvest().unwrap().unwrap(), 7);
        assert_eq!(job.status(), JobStatus::Done);
        assert!(job.harvest().is_none());
        assert!(job.finished().is_none());
    }

    #[tokio::test]
    async fn failure_is_recorded_and_cleared_on_restart() {
        let pool = WorkerPool::new(1);
        let mut job: Job<()> = Job::new();
        job.start(pool.submit(|| Err(JobError::Cancelled)));
        job.finished().unwrap().await;
        assert!(job.harvest().unwrap().is_err());
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error().is_some());

        job.start(pool.submit(|| Ok(())));
        assert!(job.is_running());
        assert!(job.error().is_none());
    }
}
