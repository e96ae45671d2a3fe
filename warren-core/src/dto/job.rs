//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobId, StateRecord};

/// Request to enqueue a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub user_id: i64,
    pub description: String,
    pub provisioning: String,
    pub request: String,
    pub continues: Option<JobId>,
}

/// Request to stop a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopJob {
    pub reason: Option<String>,
}

/// A job together with its audit history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    pub job: Job,
    pub states: Vec<StateRecord>,
}
