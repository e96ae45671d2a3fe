//! Periodic scheduler pass
//!
//! One pass promotes new jobs, retires old finished ones, enforces the
//! preparation time limit and starts the head of the waiting queue when
//! the cluster can host it. The next pass is scheduled only after the
//! current one has completed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warren_core::domain::job::{Job, JobId, JobState};

use super::{Result, Scheduler};

pub const PREPARATION_TIMEOUT: &str = "Job exceeded max preparation time";

impl Scheduler {
    /// Runs passes until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.config.poll_interval, "Scheduler loop started");
        loop {
            if let Err(e) = self.tick().await {
                error!("Scheduler pass failed: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Scheduler loop stopped");
    }

    /// One scheduler pass
    pub async fn tick(self: &Arc<Self>) -> Result<()> {
        self.promote_new_jobs().await?;
        self.archive_done_jobs().await?;
        self.check_preparations().await?;
        self.schedule_waiting_head().await
    }

    async fn promote_new_jobs(self: &Arc<Self>) -> Result<()> {
        let slots = self.config.max_parallel_prep.saturating_sub(self.preparations());
        if slots == 0 {
            return Ok(());
        }

        for job in self.repository.find_by_state(JobState::New).await?.into_iter().take(slots) {
            if let Err(e) = self.prepare_job(job.id).await {
                error!(job_id = job.id, "Failed to prepare job: {}", e);
            }
        }
        Ok(())
    }

    async fn archive_done_jobs(&self) -> Result<()> {
        let keep = self.config.keep_done_duration;
        for job in self.repository.find_by_state(JobState::Done).await? {
            if has_exceeded(&job, keep) {
                self.repository.archive(job.id).await?;
            }
        }
        Ok(())
    }

    async fn check_preparations(self: &Arc<Self>) -> Result<()> {
        let tracked: Vec<JobId> = self.state().preparations.keys().copied().collect();

        for id in tracked {
            match self.repository.find_by_id(id).await? {
                Some(job) if job.state == JobState::Preparing => {
                    if has_exceeded(&job, self.config.max_prep_duration) {
                        warn!(job_id = id, "Preparation timed out");
                        self.stop_job(id, Some(PREPARATION_TIMEOUT.to_string())).await?;
                    }
                }
                other => {
                    if other.is_none() {
                        warn!(job_id = id, "Removed preparation of orphan job");
                    }
                    self.state().preparations.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn schedule_waiting_head(self: &Arc<Self>) -> Result<()> {
        let Some(job) = self.repository.find_waiting_head().await? else {
            return Ok(());
        };

        let Some(user) = self.repository.find_user(job.user_id).await? else {
            warn!(job_id = job.id, user_id = job.user_id, "Waiting job has no user");
            let reason = format!("User {} not found", job.user_id);
            self.withdraw_waiting(job.id, reason).await?;
            return Ok(());
        };

        match self.reservations.reserve_cluster(&job.request, &user).await {
            Some(allocation) => {
                debug!(job_id = job.id, allocation = %allocation, "Cluster reserved");
                self.repository.set_allocation(job.id, Some(allocation)).await?;
                self.start_job(job.id).await
            }
            None => {
                debug!(job_id = job.id, "Cluster cannot host the waiting head yet");
                Ok(())
            }
        }
    }

    /// Takes a waiting job out of the queue and cleans it up
    pub(crate) async fn withdraw_waiting(self: &Arc<Self>, id: JobId, reason: String) -> Result<()> {
        self.repository
            .set_state(id, JobState::Stopping, Some(reason.clone()))
            .await?;
        self.clean_job(id, Some(reason)).await
    }
}

/// Whether the job has been in its current state for longer than `limit`
fn has_exceeded(job: &Job, limit: Duration) -> bool {
    let Some(since) = job.since else {
        return false;
    };
    match chrono::Duration::from_std(limit) {
        Ok(limit) => since + limit < Utc::now(),
        Err(_) => false,
    }
}
