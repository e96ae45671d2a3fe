//! API Module
//!
//! Thin HTTP status API over the scheduler. Authentication happens in
//! front of it.

pub mod error;
pub mod health;
pub mod job;
pub mod pit;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::scheduler::Scheduler;

/// Create the main API router with all endpoints
pub fn create_router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", get(job::list_jobs).post(job::create_job))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/stop", post(job::stop_job))
        // Pit endpoints
        .route("/pits", get(pit::list_pits))
        // Add state and middleware
        .with_state(scheduler)
        .layer(TraceLayer::new_for_http())
}
