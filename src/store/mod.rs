//! Persistence port for jobs and aggregated reports.
//!
//! The orchestrator only ever talks to [`JobStore`]; [`SqliteJobStore`] is the
//! backend the binary wires in.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{AggregatedReport, Job, JobError, JobId, JobRecord, JobStatus};

pub use sqlite::SqliteJobStore;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// Terminal rows are never rewritten.
    #[error("job {job_id} is already {status}")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },
}

/// Fields written on every status change.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub report_id: Option<String>,
    pub error: Option<JobError>,
}

impl StatusUpdate {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            completed_at: job.completed_at,
            report_id: job.report_id.clone(),
            error: job.error.clone(),
        }
    }
}

/// Must tolerate concurrent callers working on distinct job ids.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job row in the pending state.
    async fn create_job(&self, job: &Job) -> Result<(), PersistenceError>;

    /// Rejects updates to a job that is already completed or failed.
    async fn update_job_status(&self, update: &StatusUpdate) -> Result<(), PersistenceError>;

    /// Persist the final report and return its reference.
    async fn save_report(&self, report: &AggregatedReport) -> Result<String, PersistenceError>;

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PersistenceError>;

    async fn get_report(&self, job_id: &JobId)
        -> Result<Option<AggregatedReport>, PersistenceError>;
}
