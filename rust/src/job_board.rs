//! Job board: the sole owner of job records and their lifecycle state.

use thiserror::Error;

use crate::arena::{Entry, IdArena};
use crate::models::{Job, JobStatus, MAX_SPAN_MINUTES};

const DEFAULT_MAX_JOBS: usize = 10_000;

/// Errors raised at job intake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobBoardError {
    #[error("Job already exists: {0}")]
    DuplicateJob(String),
    #[error("Job board is full ({0} jobs)")]
    Full(usize),
    #[error("Job {0} has an out-of-range duration of {1} minutes")]
    InvalidDuration(String, i64),
}

/// Jobs indexed by id, each behind its own lock.
#[derive(Debug)]
pub struct JobBoard {
    jobs: IdArena<Job>,
    max_jobs: usize,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: IdArena::with_capacity(max_jobs.min(1024)),
            max_jobs,
        }
    }

    /// Accept a new job from intake. Ids are never reused.
    pub fn intake(&self, job: Job) -> Result<(), JobBoardError> {
        if !(0..=MAX_SPAN_MINUTES).contains(&job.estimated_duration_minutes) {
            return Err(JobBoardError::InvalidDuration(
                job.id,
                job.estimated_duration_minutes,
            ));
        }
        if self.jobs.len() >= self.max_jobs {
            return Err(JobBoardError::Full(self.max_jobs));
        }
        let id = job.id.clone();
        self.jobs
            .upsert(&id, job, |_, _| Err(JobBoardError::DuplicateJob(id.clone())))
            .map(|_| ())
    }

    /// Lockable handle for one job.
    pub fn entry(&self, id: &str) -> Option<Entry<Job>> {
        self.jobs.get(id)
    }

    pub fn snapshot(&self, id: &str) -> Option<Job> {
        self.jobs.snapshot(id)
    }

    pub fn snapshots(&self) -> Vec<Job> {
        self.jobs.snapshots()
    }

    pub fn with_status(&self, status: JobStatus) -> Vec<Job> {
        self.snapshots()
            .into_iter()
            .filter(|job| job.status == status)
            .collect()
    }

    /// Number of active jobs assigned to a technician.
    pub fn active_load(&self, technician_id: &str) -> usize {
        self.snapshots()
            .iter()
            .filter(|job| {
                job.status.is_active() && job.assigned_technician_id() == Some(technician_id)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
