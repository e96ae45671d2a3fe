//! Job API Handlers
//!
//! HTTP endpoints for job submission, inspection and stopping.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use warren_core::domain::job::{Job, JobId};
use warren_core::domain::summary::JobSummary;
use warren_core::dto::job::{CreateJob, JobDetails, StopJob};

use crate::api::error::{ApiError, ApiResult};
use crate::scheduler::Scheduler;

/// POST /jobs
/// Submit a new job; it is picked up by the next scheduler pass
pub async fn create_job(
    State(scheduler): State<Arc<Scheduler>>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    if req.request.trim().is_empty() {
        return Err(ApiError::BadRequest("Resource request cannot be empty".to_string()));
    }

    let repository = scheduler.repository();
    if repository.find_user(req.user_id).await?.is_none() {
        return Err(ApiError::BadRequest(format!("User {} not found", req.user_id)));
    }
    if let Some(parent) = req.continues {
        if repository.find_by_id(parent).await?.is_none() {
            return Err(ApiError::BadRequest(format!("Job {} not found", parent)));
        }
    }

    let job = repository.create(req).await?;
    tracing::info!("Job {} submitted by user {}", job.id, job.user_id);

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs
/// Summaries of all live jobs
pub async fn list_jobs(State(scheduler): State<Arc<Scheduler>>) -> ApiResult<Json<Vec<JobSummary>>> {
    tracing::debug!("Listing jobs");

    let summaries = scheduler.repository().summaries().await?;
    Ok(Json(summaries))
}

/// GET /jobs/{id}
/// A job with its state history
pub async fn get_job(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobDetails>> {
    tracing::debug!("Getting job: {}", id);

    let repository = scheduler.repository();
    let job = repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))?;
    let states = repository.state_history(id).await?;

    Ok(Json(JobDetails { job, states }))
}

/// POST /jobs/{id}/stop
/// Stop a preparing or running job
pub async fn stop_job(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<JobId>,
    body: Option<Json<StopJob>>,
) -> ApiResult<StatusCode> {
    let reason = body.and_then(|Json(req)| req.reason);
    tracing::info!("Stop requested for job {}", id);

    if scheduler.repository().find_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Job {} not found", id)));
    }
    scheduler.stop_job(id, reason).await?;

    Ok(StatusCode::ACCEPTED)
}
