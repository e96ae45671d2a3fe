//! Health Check API Handler

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::scheduler::Scheduler;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    /// Preparation scripts currently tracked by the scheduler
    pub preparations: usize,
}

/// GET /health
pub async fn health_check(State(scheduler): State<Arc<Scheduler>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        preparations: scheduler.preparations(),
    })
}
