//! Job Orchestrator: owns a job from submission to its terminal state.
//!
//! Per job: create → running → N sequential audit runs on one engine session
//! → aggregate → save report → completed, then at most one webhook. Any
//! engine or persistence error before completion ends the job as failed.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::audit::{AuditEngine, AuditError, AuditSession};
use crate::config::{RunSettings, MAX_RUN_COUNT};
use crate::model::{
    AggregatedReport, DeviceType, Job, JobError, JobId, NotificationTarget, RunRecord,
    RunResult, Summary, TransitionError,
};
use crate::store::{JobStore, PersistenceError, StatusUpdate};
use crate::webhook::{WebhookDispatcher, WebhookPayload};

pub const ENGINE_LAUNCH_ERROR: &str = "ENGINE_LAUNCH_ERROR";
pub const AUDIT_ERROR: &str = "AUDIT_ERROR";
pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

// ============================================================================
// Failure
// ============================================================================

/// Why a job ended as failed.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Internal(String),
}

impl From<TransitionError> for JobFailure {
    fn from(e: TransitionError) -> Self {
        JobFailure::Internal(e.to_string())
    }
}

impl JobFailure {
    pub fn code(&self) -> &'static str {
        match self {
            JobFailure::Audit(AuditError::EngineLaunch { .. }) => ENGINE_LAUNCH_ERROR,
            JobFailure::Audit(AuditError::Audit { .. }) => AUDIT_ERROR,
            JobFailure::Persistence(_) => PERSISTENCE_ERROR,
            JobFailure::Internal(_) => INTERNAL_ERROR,
        }
    }

    pub fn to_job_error(&self) -> JobError {
        let message = match self {
            JobFailure::Audit(e) => e.detail(),
            other => other.to_string(),
        };
        JobError::new(self.code(), message)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct JobOrchestrator {
    engine: Arc<dyn AuditEngine>,
    store: Arc<dyn JobStore>,
    webhooks: Arc<WebhookDispatcher>,
    settings: RunSettings,
}

impl JobOrchestrator {
    pub fn new(
        engine: Arc<dyn AuditEngine>,
        store: Arc<dyn JobStore>,
        webhooks: Arc<WebhookDispatcher>,
        settings: RunSettings,
    ) -> Self {
        Self {
            engine,
            store,
            webhooks,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Allocate the job and start its pipeline in the background.
    ///
    /// Returns as soon as the identity exists; the caller observes progress
    /// through the store or the webhook.
    pub fn submit(
        self: &Arc<Self>,
        url: impl Into<String>,
        device_type: DeviceType,
        run_count: Option<u32>,
        notification: Option<NotificationTarget>,
    ) -> JobId {
        let job = Job::new(url, device_type, notification);
        let job_id = job.id.clone();
        let run_count = run_count
            .unwrap_or(self.settings.run_count)
            .clamp(1, MAX_RUN_COUNT);

        info!(
            "Job submitted: job_id={}, url={}, device={}, runs={}",
            job_id, job.url, device_type, run_count
        );

        let this = Arc::clone(self);
        let snapshot = job.clone();
        tokio::spawn(async move {
            let pipeline = {
                let this = Arc::clone(&this);
                tokio::spawn(async move { this.run_job(job, run_count).await })
            };

            if let Err(e) = pipeline.await {
                this.abort_job(snapshot, format!("job pipeline aborted: {}", e))
                    .await;
            }
        });

        job_id
    }

    /// Drive one job to a terminal state and notify. Returns the final job.
    pub async fn run_job(&self, mut job: Job, run_count: u32) -> Job {
        let summary = match self.execute(&mut job, run_count.max(1)).await {
            Ok(summary) => Some(summary),
            Err(failure) => {
                self.record_failure(&mut job, &failure).await;
                None
            }
        };

        self.notify(&job, summary).await;
        job
    }

    /// Fail a job whose pipeline died without reaching its own terminal
    /// write. A job that already finished is left as it is.
    async fn abort_job(&self, mut job: Job, reason: String) {
        error!("Job {} pipeline aborted: {}", job.id, reason);

        if let Err(e) = job.fail(JobError::new(INTERNAL_ERROR, reason)) {
            error!("Job {} could not be marked failed: {}", job.id, e);
            return;
        }
        match self
            .store
            .update_job_status(&StatusUpdate::from_job(&job))
            .await
        {
            Ok(()) => self.notify(&job, None).await,
            Err(PersistenceError::AlreadyTerminal { status, .. }) => {
                warn!(
                    "Job {} already {} before its pipeline aborted; keeping that outcome",
                    job.id, status
                );
            }
            Err(e) => error!("Failed to record aborted job {}: {}", job.id, e),
        }
    }

    async fn execute(&self, job: &mut Job, run_count: u32) -> Result<Summary, JobFailure> {
        self.store.create_job(job).await?;

        job.start()?;
        self.store
            .update_job_status(&StatusUpdate::from_job(job))
            .await?;
        info!("Job {} running ({} runs)", job.id, run_count);

        let runs = self.collect_runs(job, run_count).await?;
        let results: Vec<RunResult> = runs.iter().map(|r| r.result.clone()).collect();
        let summary = aggregate(&results);

        let report = AggregatedReport {
            job_id: job.id.clone(),
            url: job.url.clone(),
            device_type: job.device_type,
            created_at: job.created_at,
            completed_at: Utc::now(),
            scores: summary.scores,
            metrics: summary.metrics,
            runs,
        };
        let report_id = self.store.save_report(&report).await?;

        job.complete(report_id)?;
        if let Err(e) = self
            .store
            .update_job_status(&StatusUpdate::from_job(job))
            .await
        {
            error!("Failed to record completion of job {}: {}", job.id, e);
        }
        info!(
            "Job {} completed: performance={:.2}, report_id={}",
            job.id,
            summary.scores.performance,
            job.report_id.as_deref().unwrap_or("")
        );

        Ok(summary)
    }

    /// One engine session for all runs, closed on every exit path including
    /// a panic inside a run.
    async fn collect_runs(&self, job: &Job, run_count: u32) -> Result<Vec<RunRecord>, AuditError> {
        let mut session = self.engine.launch().await?;
        let outcome = AssertUnwindSafe(self.run_sequence(session.as_mut(), job, run_count))
            .catch_unwind()
            .await;
        session.close().await;
        debug!("Engine session for job {} released", job.id);

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn run_sequence(
        &self,
        session: &mut dyn AuditSession,
        job: &Job,
        run_count: u32,
    ) -> Result<Vec<RunRecord>, AuditError> {
        let mut runs = Vec::with_capacity(run_count as usize);

        for run_number in 1..=run_count {
            info!(
                "Job {}: run {}/{} ({} {})",
                job.id, run_number, run_count, job.url, job.device_type
            );
            let result = session.run_once(&job.url, job.device_type).await?;
            debug!(
                "Job {}: run {} performance={:.2}",
                job.id, run_number, result.scores.performance
            );
            runs.push(RunRecord {
                run_number,
                timestamp: Utc::now(),
                result,
            });

            if run_number < run_count {
                cooldown(self.settings.cooldown).await;
            }
        }

        Ok(runs)
    }

    async fn record_failure(&self, job: &mut Job, failure: &JobFailure) {
        error!("Job {} failed [{}]: {}", job.id, failure.code(), failure);

        if let Err(e) = job.fail(failure.to_job_error()) {
            error!("Job {} could not be marked failed: {}", job.id, e);
            return;
        }
        if let Err(e) = self
            .store
            .update_job_status(&StatusUpdate::from_job(job))
            .await
        {
            error!("Failed to record failure of job {}: {}", job.id, e);
        }
    }

    async fn notify(&self, job: &Job, summary: Option<Summary>) {
        let Some(target) = &job.notification else {
            return;
        };
        if !job.status.is_terminal() {
            return;
        }

        let payload = WebhookPayload::for_job(job, summary);
        if let Err(e) = self
            .webhooks
            .send(&target.url, &payload, target.secret.as_deref())
            .await
        {
            warn!("Webhook for job {} not delivered: {}", job.id, e);
        }
    }
}

async fn cooldown(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
