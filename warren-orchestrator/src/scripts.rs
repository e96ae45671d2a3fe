//! Script Runner
//!
//! Runs the preparation and cleanup scripts as child processes. A spawned
//! script is split into a [`ScriptKiller`], kept by the scheduler so it can
//! cancel the run, and a [`ScriptCompletion`] resolving to the outcome.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const PREPARE_SCRIPT: &str = "prepare.sh";
pub const CLEAN_SCRIPT: &str = "clean.sh";

/// Exit code reported for a script terminated by a signal
pub const KILLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to spawn {script}: {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while running script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script run was abandoned before completing")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, ScriptError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Cancels a running script
#[derive(Debug)]
pub struct ScriptKiller(oneshot::Sender<()>);

impl ScriptKiller {
    pub fn kill(self) {
        // The script may already have finished
        let _ = self.0.send(());
    }
}

/// Resolves once the script has exited
#[derive(Debug)]
pub struct ScriptCompletion(oneshot::Receiver<Result<ScriptOutcome>>);

impl ScriptCompletion {
    pub async fn wait(self) -> Result<ScriptOutcome> {
        self.0.await.map_err(|_| ScriptError::Aborted)?
    }
}

/// A script that has been started
#[derive(Debug)]
pub struct RunningScript {
    pub killer: ScriptKiller,
    pub completion: ScriptCompletion,
}

/// The runner's side of a [`RunningScript`]
#[derive(Debug)]
pub struct ScriptControl {
    /// Resolves with `Ok(())` when the script must be terminated
    pub kill: oneshot::Receiver<()>,
    pub outcome: oneshot::Sender<Result<ScriptOutcome>>,
}

impl ScriptControl {
    pub fn finish(self, outcome: Result<ScriptOutcome>) {
        let _ = self.outcome.send(outcome);
    }
}

/// Wires a [`RunningScript`] to the control half a runner drives
pub fn script_channel() -> (ScriptControl, RunningScript) {
    let (kill_tx, kill_rx) = oneshot::channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        ScriptControl {
            kill: kill_rx,
            outcome: outcome_tx,
        },
        RunningScript {
            killer: ScriptKiller(kill_tx),
            completion: ScriptCompletion(outcome_rx),
        },
    )
}

/// Executes named scripts with an environment
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn spawn(&self, script: &str, env: BTreeMap<String, String>) -> Result<RunningScript>;
}

/// Runs scripts from a directory as child processes
#[derive(Debug, Clone)]
pub struct ProcessScriptRunner {
    scripts_dir: PathBuf,
}

impl ProcessScriptRunner {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }
}

#[async_trait]
impl ScriptRunner for ProcessScriptRunner {
    async fn spawn(&self, script: &str, env: BTreeMap<String, String>) -> Result<RunningScript> {
        let path = self.scripts_dir.join(script);
        debug!(script, path = %path.display(), "Spawning script");

        let mut child = Command::new(&path)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                script: script.to_string(),
                source,
            })?;

        let (control, running) = script_channel();
        let script = script.to_string();
        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        tokio::spawn(async move {
            let ScriptControl { kill, outcome } = control;
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill => {
                    warn!(script = %script, "Killing script");
                    if let Err(e) = child.kill().await {
                        warn!(script = %script, "Failed to kill script: {}", e);
                    }
                    child.wait().await
                }
            };

            let result = match status {
                Ok(status) => Ok(ScriptOutcome {
                    exit_code: status.code().unwrap_or(KILLED_EXIT_CODE),
                    stdout: stdout.await.unwrap_or_default(),
                    stderr: stderr.await.unwrap_or_default(),
                }),
                Err(e) => Err(ScriptError::Io(e)),
            };
            let _ = outcome.send(result);
        });

        Ok(running)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}
