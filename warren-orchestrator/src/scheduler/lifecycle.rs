//! Job lifecycle operations
//!
//! Scripts run in the background: `prepare_job` and `clean_job` return as
//! soon as the script is spawned and a task applies the outcome later.
//! Starting a job runs to completion, so a tick that starts a job waits for
//! its pit.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use warren_core::domain::job::{Job, JobId, JobState};
use warren_core::domain::node::Cluster;
use warren_core::domain::topology::ProcessGroup;
use warren_core::domain::user::User;

use super::{DATA_ROOT, Result, Scheduler, SchedulerError};
use crate::config::Config;
use crate::pits::definition::{Device, Devices};
use crate::pits::naming::worker_host;
use crate::pits::{PitSpec, PitWorker};
use crate::scripts::{CLEAN_SCRIPT, PREPARE_SCRIPT, ScriptCompletion, ScriptOutcome};

const PIT_DIR: &str = "/data/rw/pit";
const SRC_DIR: &str = "/data/rw/pit/src";
const SHARED_DIR: &str = "/data/ro/shared";
const USER_DIR: &str = "/data/rw/home";

pub const STOPPING_FAILED: &str = "Problem during stopping";

impl Scheduler {
    // =============================================================================
    // Preparation
    // =============================================================================

    /// Moves a job to PREPARING and runs its preparation script
    ///
    /// The job becomes stoppable only once its script is registered, so a
    /// concurrent `stop_job` always finds the script to kill.
    pub async fn prepare_job(self: &Arc<Self>, id: JobId) -> Result<()> {
        let guard = self.lifecycle.lock().await;
        let job = self.repository.set_state(id, JobState::Preparing, None).await?;
        info!(job_id = id, "Preparing job");

        let running = match self.scripts.spawn(PREPARE_SCRIPT, self.preparation_env(&job)).await {
            Ok(running) => running,
            Err(e) => {
                error!(job_id = id, "Failed to start preparation: {}", e);
                let reason = format!("Problem during preparation step - {}", e);
                self.repository.set_state(id, JobState::Done, Some(reason)).await?;
                return Ok(());
            }
        };

        self.state().preparations.insert(id, running.killer);
        drop(guard);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = scheduler.finish_preparation(id, running.completion).await {
                error!(job_id = id, "Failed to complete preparation: {}", e);
            }
        });
        Ok(())
    }

    async fn finish_preparation(&self, id: JobId, completion: ScriptCompletion) -> Result<()> {
        let outcome = completion.wait().await;

        let _guard = self.lifecycle.lock().await;
        self.state().preparations.remove(&id);

        let Some(job) = self.repository.find_by_id(id).await? else {
            return Ok(());
        };
        if job.state != JobState::Preparing {
            // Stopped meanwhile; the stop path owns the job now
            debug!(job_id = id, state = %job.state, "Ignoring preparation outcome");
            return Ok(());
        }

        match outcome {
            Ok(outcome) if outcome.success() && self.config.job_dir(id).is_dir() => {
                let job = self.repository.set_state(id, JobState::Waiting, None).await?;
                info!(job_id = id, rank = job.rank, "Job prepared");
            }
            Ok(outcome) => {
                warn!(job_id = id, exit_code = outcome.exit_code, "Preparation failed");
                let reason = script_failure("preparation", &outcome, true);
                self.repository.set_state(id, JobState::Done, Some(reason)).await?;
            }
            Err(e) => {
                warn!(job_id = id, "Preparation failed: {}", e);
                let reason = format!("Problem during preparation step - {}", e);
                self.repository.set_state(id, JobState::Done, Some(reason)).await?;
            }
        }
        Ok(())
    }

    // =============================================================================
    // Start
    // =============================================================================

    /// Moves a job to STARTING and creates its pit
    ///
    /// A job whose pit cannot be created is cleaned up with the failure as
    /// reason; that is not an error of this call.
    pub async fn start_job(self: &Arc<Self>, id: JobId) -> Result<()> {
        let job = self.repository.set_state(id, JobState::Starting, None).await?;
        info!(job_id = id, "Starting job");

        let started = match self.pit_spec(&job).await {
            Ok(spec) => self.pits.create_pit(&spec).await.map_err(SchedulerError::from),
            Err(e) => Err(e),
        };

        match started {
            Ok(()) => match self.repository.set_state(id, JobState::Running, None).await {
                Ok(_) => info!(job_id = id, "Job running"),
                Err(e) => {
                    // The pit is up but the job never ran
                    error!(job_id = id, "Failed to mark job running: {}", e);
                    if let Err(e) = self.pits.drop_pit(id).await {
                        warn!(job_id = id, "Failed to drop pit of unstarted job: {}", e);
                    }
                    self.clean_job(id, Some(format!("Problem during startup: {}", e)))
                        .await?;
                }
            },
            Err(e) => {
                error!(job_id = id, "Failed to start job: {}", e);
                self.clean_job(id, Some(format!("Problem during startup: {}", e)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn pit_spec(&self, job: &Job) -> Result<PitSpec> {
        let user = self
            .repository
            .find_user(job.user_id)
            .await?
            .ok_or(SchedulerError::UserNotFound(job.user_id))?;
        let groups = self.repository.process_topology(job.id).await?;

        build_pit_spec(&self.config, self.pits.cluster(), job, &user, &groups)
    }

    // =============================================================================
    // Stop
    // =============================================================================

    /// Stops a preparing or running job and cleans it up
    ///
    /// Jobs in any other state are left alone. A failure while stopping
    /// sends the job to cleanup right away.
    pub async fn stop_job(self: &Arc<Self>, id: JobId, reason: Option<String>) -> Result<()> {
        let guard = self.lifecycle.lock().await;
        let Some(job) = self.repository.find_by_id(id).await? else {
            return Ok(());
        };

        match job.state {
            JobState::Preparing => {
                let killer = self.state().preparations.remove(&id);
                let stopping = self.repository.set_state(id, JobState::Stopping, reason.clone()).await;
                drop(guard);

                if let Some(killer) = killer {
                    killer.kill();
                }
                if let Err(e) = stopping {
                    error!(job_id = id, "Failed to stop job: {}", e);
                    return self.clean_job(id, Some(STOPPING_FAILED.to_string())).await;
                }
            }
            JobState::Running => {
                let stopping = self.repository.set_state(id, JobState::Stopping, reason.clone()).await;
                drop(guard);

                let stopped = match stopping {
                    Ok(_) => self.pits.drop_pit(id).await.map_err(SchedulerError::from),
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = stopped {
                    error!(job_id = id, "Failed to stop job: {}", e);
                    return self.clean_job(id, Some(STOPPING_FAILED.to_string())).await;
                }
            }
            _ => {
                debug!(job_id = id, state = %job.state, "Nothing to stop");
                return Ok(());
            }
        }

        info!(job_id = id, "Job stopped");
        self.clean_job(id, reason).await
    }

    // =============================================================================
    // Cleanup
    // =============================================================================

    /// Moves a job to CLEANING and runs its cleanup script; the job ends in
    /// DONE whatever the script's outcome
    pub async fn clean_job(self: &Arc<Self>, id: JobId, reason: Option<String>) -> Result<()> {
        let job = self.repository.set_state(id, JobState::Cleaning, reason.clone()).await?;
        info!(job_id = id, "Cleaning job");

        match self.scripts.spawn(CLEAN_SCRIPT, self.preparation_env(&job)).await {
            Ok(running) => {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = running.completion.wait().await.map_err(SchedulerError::from);
                    if let Err(e) = scheduler.finish_cleaning(id, reason, outcome).await {
                        error!(job_id = id, "Failed to complete cleanup: {}", e);
                    }
                });
                Ok(())
            }
            Err(e) => self.finish_cleaning(id, reason, Err(e.into())).await,
        }
    }

    async fn finish_cleaning(
        &self,
        id: JobId,
        reason: Option<String>,
        outcome: Result<ScriptOutcome>,
    ) -> Result<()> {
        let reason = match outcome {
            Ok(outcome) if outcome.success() => reason,
            Ok(outcome) => {
                warn!(job_id = id, exit_code = outcome.exit_code, "Cleanup failed");
                Some(script_failure("cleaning", &outcome, false))
            }
            Err(e) => {
                warn!(job_id = id, "Cleanup failed: {}", e);
                Some(format!("Problem during cleaning step - {}", e))
            }
        };

        self.repository.set_state(id, JobState::Done, reason).await?;
        info!(job_id = id, "Job done");
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn script_failure(step: &str, outcome: &ScriptOutcome, with_stdout: bool) -> String {
    let mut reason = format!("Problem during {} step - exit code: {}", step, outcome.exit_code);
    if with_stdout {
        reason.push('\n');
        reason.push_str(&outcome.stdout);
    }
    reason.push('\n');
    reason.push_str(&outcome.stderr);
    reason
}

/// Expands a job's topology into the pit that runs it
///
/// Every worker sees the job environment (directories, group and host
/// layout) plus its own `GROUP_INDEX` and `PROCESS_INDEX`. The daemon
/// mounts the shared, user, group and job directories.
pub fn build_pit_spec(
    config: &Config,
    cluster: &Cluster,
    job: &Job,
    user: &User,
    groups: &[ProcessGroup],
) -> Result<PitSpec> {
    let mut env = BTreeMap::from([
        ("JOB_NUMBER".to_string(), job.id.to_string()),
        ("DATA_ROOT".to_string(), DATA_ROOT.to_string()),
        ("JOB_DIR".to_string(), PIT_DIR.to_string()),
        ("SRC_DIR".to_string(), SRC_DIR.to_string()),
        ("WORK_DIR".to_string(), SRC_DIR.to_string()),
        ("SHARED_DIR".to_string(), SHARED_DIR.to_string()),
        ("USER_DIR".to_string(), USER_DIR.to_string()),
    ]);

    let mut shares = BTreeMap::from([
        (SHARED_DIR.to_string(), config.shared_dir().display().to_string()),
        (USER_DIR.to_string(), config.user_dir(&user.name).display().to_string()),
        (PIT_DIR.to_string(), config.job_dir(job.id).display().to_string()),
    ]);
    for group in &user.groups {
        let dir = format!("/data/rw/group-{}", group);
        env.insert(format!("{}_GROUP_DIR", group.to_uppercase()), dir.clone());
        shares.insert(dir, config.group_dir(group).display().to_string());
    }

    let mut placed = Vec::new();
    env.insert("NUM_GROUPS".to_string(), groups.len().to_string());
    for group in groups {
        env.insert(
            format!("NUM_PROCESSES_GROUP{}", group.index),
            group.processes.len().to_string(),
        );
        for process in &group.processes {
            let node = cluster
                .node(&process.node_id)
                .ok_or_else(|| SchedulerError::UnknownNode {
                    job_id: job.id,
                    node_id: process.node_id.clone(),
                })?;
            env.insert(
                format!("HOST_GROUP{}_PROCESS{}", group.index, process.index),
                worker_host(job.id, node, placed.len()),
            );
            placed.push((group.index, process, node.clone()));
        }
    }

    let script = (!job.provisioning.is_empty()).then(|| job.provisioning.clone());
    let workers = placed
        .into_iter()
        .map(|(group_index, process, node)| {
            let devices: Devices = process
                .cuda_indices()
                .map(|index| (format!("gpu{}", index), Device::gpu(index)))
                .collect();
            let mut env = env.clone();
            env.insert("GROUP_INDEX".to_string(), group_index.to_string());
            env.insert("PROCESS_INDEX".to_string(), process.index.to_string());
            PitWorker {
                node,
                devices,
                env,
                script: script.clone(),
            }
        })
        .collect();

    Ok(PitSpec {
        pit_id: job.id,
        shares,
        workers,
    })
}
