use axum::extract::{Path, State};
use axum::Json;

use crate::error::ObserverError;
use crate::model::{AggregatedReport, JobId, JobRecord};
use crate::state::SharedState;

pub async fn get_job(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, ObserverError> {
    let job_id = JobId::from(job_id);
    state
        .store
        .get_job(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("Job {} not found", job_id)))
}

pub async fn get_report(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<AggregatedReport>, ObserverError> {
    let job_id = JobId::from(job_id);
    state
        .store
        .get_report(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("No report for job {}", job_id)))
}
