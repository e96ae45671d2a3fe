//! Repository Module
//!
//! Data access layer for the orchestrator. The scheduler only talks to
//! persistence through [`JobRepository`], which has a Postgres
//! implementation for production and an in-memory one for tests.
//!
//! `set_state` is the only way to change a job's `state` or `rank`. Every
//! implementation applies the same steps, planned by
//! [`warren_core::domain::job::Transition`], atomically with respect to
//! other transitions of the same job.

pub mod job;
pub mod memory;

pub use job::PgJobRepository;
pub use memory::MemoryJobRepository;

use async_trait::async_trait;
use thiserror::Error;
use warren_core::domain::job::{Job, JobId, JobState, StateRecord};
use warren_core::domain::summary::JobSummary;
use warren_core::domain::topology::ProcessGroup;
use warren_core::domain::user::User;
use warren_core::dto::job::CreateJob;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Persistence of jobs, their audit history and their topology
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a job in state NEW
    async fn create(&self, req: CreateJob) -> Result<Job>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// Jobs in `state`, oldest first (waiting jobs in rank order)
    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>>;

    /// Jobs whose state lies in `from..=to`, oldest first
    async fn find_by_state_range(&self, from: JobState, to: JobState) -> Result<Vec<Job>>;

    /// The waiting job with rank 1, if any
    async fn find_waiting_head(&self) -> Result<Option<Job>>;

    /// Move a job to `state`, recording `reason`
    ///
    /// A request for the state the job is already in changes nothing.
    /// Otherwise the (job, state) record is upserted, the waiting queue is
    /// kept densely ranked, and the new state is stored, all in one
    /// transaction. On failure nothing is changed and the error returned.
    async fn set_state(&self, id: JobId, state: JobState, reason: Option<String>) -> Result<Job>;

    /// All state records of a job, in lifecycle order
    async fn state_history(&self, id: JobId) -> Result<Vec<StateRecord>>;

    async fn set_allocation(&self, id: JobId, allocation: Option<String>) -> Result<()>;

    /// Retire a job; archived jobs no longer show up in any query
    async fn archive(&self, id: JobId) -> Result<()>;

    /// Process groups of a job with their processes and allocations
    async fn process_topology(&self, id: JobId) -> Result<Vec<ProcessGroup>>;

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    /// Summaries of all live jobs
    async fn summaries(&self) -> Result<Vec<JobSummary>>;
}
