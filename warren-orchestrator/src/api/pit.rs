//! Pit API Handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use warren_core::domain::job::JobId;

use crate::api::error::ApiResult;
use crate::scheduler::Scheduler;

/// GET /pits
/// Ids of the pits present on the control node
pub async fn list_pits(State(scheduler): State<Arc<Scheduler>>) -> ApiResult<Json<Vec<JobId>>> {
    tracing::debug!("Listing pits");

    let pits = scheduler.pits().get_pits().await?;
    Ok(Json(pits))
}
