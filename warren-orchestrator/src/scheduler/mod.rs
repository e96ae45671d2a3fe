//! Scheduler
//!
//! Drives every job through prepare → wait → start → run → stop → clean.
//! The periodic tick and the cluster event handlers are the only callers of
//! the state machine and the pit orchestrator.
//!
//! - [`lifecycle`]: the per-job operations (prepare, start, stop, clean)
//! - [`tick`]: the periodic pass and its loop
//! - [`reconcile`]: cluster event handling, startup recovery, pit reports

pub mod lifecycle;
pub mod reconcile;
pub mod tick;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use warren_core::domain::job::{Job, JobId};

use crate::config::Config;
use crate::pits::{PitError, PitOrchestrator};
use crate::repository::{JobRepository, RepositoryError};
use crate::reservations::Reservations;
use crate::scripts::{ScriptError, ScriptKiller, ScriptRunner};

/// Data root as seen by the scripts and inside the containers
pub const DATA_ROOT: &str = "/data";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Pit(#[from] PitError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Process of job {job_id} is placed on unknown node '{node_id}'")]
    UnknownNode { job_id: JobId, node_id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// In-memory state owned by the scheduler
#[derive(Default)]
pub struct SchedulerState {
    /// Running preparation scripts, keyed by job
    preparations: HashMap<JobId, ScriptKiller>,
}

/// Collaborators the scheduler works with
pub struct SchedulerDeps {
    pub repository: Arc<dyn JobRepository>,
    pub pits: Arc<PitOrchestrator>,
    pub scripts: Arc<dyn ScriptRunner>,
    pub reservations: Arc<dyn Reservations>,
}

pub struct Scheduler {
    config: Config,
    repository: Arc<dyn JobRepository>,
    pits: Arc<PitOrchestrator>,
    scripts: Arc<dyn ScriptRunner>,
    reservations: Arc<dyn Reservations>,
    state: Mutex<SchedulerState>,
    /// Held while deciding on and applying the transitions a preparation
    /// completion and a stop request compete for
    lifecycle: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(config: Config, deps: SchedulerDeps) -> Arc<Self> {
        Arc::new(Self {
            config,
            repository: deps.repository,
            pits: deps.pits,
            scripts: deps.scripts,
            reservations: deps.reservations,
            state: Mutex::new(SchedulerState::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    pub fn pits(&self) -> &Arc<PitOrchestrator> {
        &self.pits
    }

    /// Number of preparation scripts currently tracked
    pub fn preparations(&self) -> usize {
        self.state().preparations.len()
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Environment of the preparation and cleanup scripts
    fn preparation_env(&self, job: &Job) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([
            ("JOB_NUMBER".to_string(), job.id.to_string()),
            ("DATA_ROOT".to_string(), DATA_ROOT.to_string()),
            (
                "JOB_DIR".to_string(),
                self.config.job_dir(job.id).display().to_string(),
            ),
        ]);
        if let Some(parent) = job.continues {
            env.insert("CONTINUE_JOB_NUMBER".to_string(), parent.to_string());
        }
        env
    }
}
