//! In-memory job repository
//!
//! Keeps everything behind a single mutex, so each operation is trivially
//! atomic. Used by the scheduler tests and for running without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use warren_core::domain::job::{Job, JobId, JobState, QueueChange, StateRecord, Transition};
use warren_core::domain::summary::JobSummary;
use warren_core::domain::topology::ProcessGroup;
use warren_core::domain::user::User;
use warren_core::dto::job::CreateJob;

use super::{JobRepository, RepositoryError, Result};

#[derive(Default)]
struct Store {
    next_id: JobId,
    jobs: HashMap<JobId, Job>,
    archived: HashMap<JobId, Job>,
    states: HashMap<(JobId, JobState), StateRecord>,
    topologies: HashMap<JobId, Vec<ProcessGroup>>,
    users: HashMap<i64, User>,
}

impl Store {
    fn job(&self, id: JobId) -> Result<&Job> {
        self.jobs.get(&id).ok_or(RepositoryError::JobNotFound(id))
    }

    fn sorted(&self, mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by_key(|j| (j.rank, j.id));
        jobs
    }
}

#[derive(Default)]
pub struct MemoryJobRepository {
    store: Mutex<Store>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.store.lock().await.users.insert(user.id, user);
    }

    pub async fn set_topology(&self, id: JobId, groups: Vec<ProcessGroup>) {
        self.store.lock().await.topologies.insert(id, groups);
    }

    /// Ids of archived jobs
    pub async fn archived(&self) -> Vec<JobId> {
        let store = self.store.lock().await;
        let mut ids: Vec<JobId> = store.archived.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Overwrites when a job entered its current state
    pub async fn backdate(&self, id: JobId, since: chrono::DateTime<Utc>) -> Result<()> {
        let mut store = self.store.lock().await;
        let job = store.jobs.get_mut(&id).ok_or(RepositoryError::JobNotFound(id))?;
        job.since = Some(since);
        let state = job.state;
        if let Some(record) = store.states.get_mut(&(id, state)) {
            record.since = since;
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, req: CreateJob) -> Result<Job> {
        let mut store = self.store.lock().await;
        store.next_id += 1;
        let id = store.next_id;
        let now = Utc::now();

        let job = Job {
            id,
            user_id: req.user_id,
            description: req.description,
            provisioning: req.provisioning,
            request: req.request,
            state: JobState::New,
            rank: 0,
            allocation: None,
            continues: req.continues,
            since: Some(now),
        };

        store.states.insert(
            (id, JobState::New),
            StateRecord {
                job_id: id,
                state: JobState::New,
                since: now,
                reason: None,
            },
        );
        store.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.store.lock().await.jobs.get(&id).cloned())
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let store = self.store.lock().await;
        let jobs = store.jobs.values().filter(|j| j.state == state).cloned().collect();
        Ok(store.sorted(jobs))
    }

    async fn find_by_state_range(&self, from: JobState, to: JobState) -> Result<Vec<Job>> {
        let store = self.store.lock().await;
        let mut jobs: Vec<Job> = store
            .jobs
            .values()
            .filter(|j| (from..=to).contains(&j.state))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn find_waiting_head(&self) -> Result<Option<Job>> {
        let store = self.store.lock().await;
        Ok(store.jobs.values().find(|j| j.is_waiting() && j.rank == 1).cloned())
    }

    async fn set_state(&self, id: JobId, state: JobState, reason: Option<String>) -> Result<Job> {
        let mut store = self.store.lock().await;
        let current = store.job(id)?.clone();

        let Some(transition) = Transition::plan(current.state, current.rank, state) else {
            return Ok(current);
        };

        let now = Utc::now();
        store.states.insert(
            (id, state),
            StateRecord {
                job_id: id,
                state,
                since: now,
                reason,
            },
        );

        let max_rank = match transition.queue {
            QueueChange::Enqueue => store
                .jobs
                .values()
                .filter(|j| j.is_waiting())
                .map(|j| j.rank)
                .max(),
            QueueChange::Dequeue { vacated_rank } => {
                for job in store.jobs.values_mut() {
                    if job.id != id && job.is_waiting() && job.rank > vacated_rank {
                        job.rank -= 1;
                    }
                }
                None
            }
            QueueChange::Unchanged => None,
        };

        let next_rank = transition.next_rank(current.rank, max_rank);
        let job = store.jobs.get_mut(&id).ok_or(RepositoryError::JobNotFound(id))?;
        job.state = state;
        job.rank = next_rank;
        job.since = Some(now);
        Ok(job.clone())
    }

    async fn state_history(&self, id: JobId) -> Result<Vec<StateRecord>> {
        let store = self.store.lock().await;
        let mut records: Vec<StateRecord> = store
            .states
            .values()
            .filter(|r| r.job_id == id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.state);
        Ok(records)
    }

    async fn set_allocation(&self, id: JobId, allocation: Option<String>) -> Result<()> {
        let mut store = self.store.lock().await;
        let job = store.jobs.get_mut(&id).ok_or(RepositoryError::JobNotFound(id))?;
        job.allocation = allocation;
        Ok(())
    }

    async fn archive(&self, id: JobId) -> Result<()> {
        let mut store = self.store.lock().await;
        if let Some(job) = store.jobs.remove(&id) {
            store.archived.insert(id, job);
        }
        Ok(())
    }

    async fn process_topology(&self, id: JobId) -> Result<Vec<ProcessGroup>> {
        let store = self.store.lock().await;
        Ok(store.topologies.get(&id).cloned().unwrap_or_default())
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.store.lock().await.users.get(&id).cloned())
    }

    async fn summaries(&self) -> Result<Vec<JobSummary>> {
        let store = self.store.lock().await;
        let mut summaries: Vec<JobSummary> = store
            .jobs
            .values()
            .map(|job| {
                let groups = store.topologies.get(&job.id).map(Vec::as_slice).unwrap_or(&[]);
                JobSummary::from_topology(job, groups)
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        Ok(summaries)
    }
}
