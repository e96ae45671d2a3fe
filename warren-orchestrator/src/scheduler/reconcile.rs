//! Reconciliation with the cluster
//!
//! Cluster events report disruptions the scheduler did not cause itself:
//! lost capacity, pits stopping on their own, pits that appeared or
//! vanished. Startup recovery handles jobs whose scripts died with the
//! previous process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warren_core::domain::job::{JobId, JobState};

use super::{Result, Scheduler};
use crate::events::{ClusterEvent, ClusterEvents};
use crate::pits::PitOrchestrator;

pub const CAPACITY_LOST: &str = "Cluster cannot fulfill resource request anymore";
pub const PREPARATION_INTERRUPTED: &str = "Job interrupted during preparation";
pub const PIT_VANISHED: &str = "Pit no longer present on the cluster";

impl Scheduler {
    /// Handles cluster events until the channel closes or `shutdown` is cancelled
    pub async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ClusterEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let topic = event.topic().name();
            if let Err(e) = self.handle_event(event).await {
                error!(topic, "Failed to handle cluster event: {}", e);
            }
        }
    }

    pub async fn handle_event(self: &Arc<Self>, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::Restricted => self.recheck_reservations().await,
            ClusterEvent::PitStopping(id) => {
                if self.repository.find_by_id(id).await?.is_some() {
                    self.repository.set_state(id, JobState::Stopping, None).await?;
                }
                Ok(())
            }
            ClusterEvent::PitStopped(id) => {
                if self.repository.find_by_id(id).await?.is_some() {
                    self.clean_job(id, None).await?;
                }
                Ok(())
            }
            ClusterEvent::PitReport(live) => self.reconcile_pits(&live).await,
        }
    }

    /// Stops every job between PREPARING and WAITING whose request the
    /// cluster can no longer satisfy
    async fn recheck_reservations(self: &Arc<Self>) -> Result<()> {
        let jobs = self
            .repository
            .find_by_state_range(JobState::Preparing, JobState::Waiting)
            .await?;

        for job in jobs {
            let allocatable = match self.repository.find_user(job.user_id).await? {
                Some(user) => self.reservations.can_allocate(&job.request, &user).await,
                None => false,
            };
            if allocatable {
                continue;
            }

            info!(job_id = job.id, "Request no longer satisfiable");
            if job.state == JobState::Waiting {
                self.withdraw_waiting(job.id, CAPACITY_LOST.to_string()).await?;
            } else {
                self.stop_job(job.id, Some(CAPACITY_LOST.to_string())).await?;
            }
        }
        Ok(())
    }

    /// Stops running jobs whose pit is gone and drops pits without a job
    async fn reconcile_pits(self: &Arc<Self>, live: &[JobId]) -> Result<()> {
        let live: HashSet<JobId> = live.iter().copied().collect();

        let missing: Vec<JobId> = self
            .repository
            .find_by_state(JobState::Running)
            .await?
            .into_iter()
            .map(|job| job.id)
            .filter(|id| !live.contains(id))
            .collect();
        if !missing.is_empty() {
            // The report may predate a pit created since; confirm against a
            // fresh listing before stopping anything
            match self.pits.get_pits().await {
                Ok(current) => {
                    for id in missing.into_iter().filter(|id| !current.contains(id)) {
                        warn!(job_id = id, "Pit of running job vanished");
                        self.stop_job(id, Some(PIT_VANISHED.to_string())).await?;
                    }
                }
                Err(e) => warn!("Failed to confirm vanished pits: {}", e),
            }
        }

        let active: HashSet<JobId> = self
            .repository
            .find_by_state_range(JobState::Starting, JobState::Stopping)
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();
        for pit_id in live.difference(&active) {
            warn!(pit_id, "Dropping pit without job");
            if let Err(e) = self.pits.drop_pit(*pit_id).await {
                warn!(pit_id, "Failed to drop stray pit: {}", e);
            }
        }
        Ok(())
    }

    /// Recovers jobs whose scripts were lost with the previous process
    pub async fn startup(self: &Arc<Self>) -> Result<()> {
        for job in self.repository.find_by_state(JobState::Preparing).await? {
            warn!(job_id = job.id, "Preparation was interrupted");
            self.clean_job(job.id, Some(PREPARATION_INTERRUPTED.to_string()))
                .await?;
        }

        for job in self.repository.find_by_state(JobState::Cleaning).await? {
            let reason = self
                .repository
                .state_history(job.id)
                .await?
                .into_iter()
                .find(|record| record.state == JobState::Cleaning)
                .and_then(|record| record.reason);
            info!(job_id = job.id, "Resuming cleanup");
            self.clean_job(job.id, reason).await?;
        }
        Ok(())
    }
}

/// Publishes the pits present on the control node every `interval`
pub async fn monitor_pits(
    pits: Arc<PitOrchestrator>,
    events: Arc<ClusterEvents>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        match pits.get_pits().await {
            Ok(live) => {
                events.publish(ClusterEvent::PitReport(live));
            }
            Err(e) => warn!("Failed to list pits: {}", e),
        }
    }
}
