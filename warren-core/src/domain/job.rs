//! Job domain types
//!
//! A job moves through a fixed set of lifecycle states. Only the `Waiting`
//! state carries extra bookkeeping: the job's `rank` in the FIFO queue of
//! waiting jobs. The rules for keeping that queue densely ranked live in
//! [`Transition::plan`] so every persistence backend applies the same steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job identifier. A job's pit shares this identifier.
pub type JobId = i64;

/// A compute job
///
/// Owned by the persistence layer; `state` and `rank` are only ever changed
/// through a state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: i64,
    pub description: String,
    /// Provisioning script run inside every worker container
    pub provisioning: String,
    /// Resource request descriptor handed to the reservation service
    pub request: String,
    pub state: JobState,
    /// Position in the waiting queue, 1-based. Zero unless `state == Waiting`.
    pub rank: i32,
    pub allocation: Option<String>,
    /// Parent job this one resumes from
    pub continues: Option<JobId>,
    /// When the job entered its current state
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub since: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether the job currently sits in the waiting queue
    pub fn is_waiting(&self) -> bool {
        self.state == JobState::Waiting
    }
}

/// Job lifecycle state
///
/// The declaration order is the persisted order: states are stored as
/// small integers so that ranges such as `Preparing..=Waiting` can be
/// queried directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    New,
    Preparing,
    Waiting,
    Starting,
    Running,
    Stopping,
    Cleaning,
    Done,
}

impl JobState {
    pub const ALL: [JobState; 8] = [
        JobState::New,
        JobState::Preparing,
        JobState::Waiting,
        JobState::Starting,
        JobState::Running,
        JobState::Stopping,
        JobState::Cleaning,
        JobState::Done,
    ];

    /// Persisted representation
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Parses the persisted representation
    pub fn from_i16(value: i16) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::New => "NEW",
            JobState::Preparing => "PREPARING",
            JobState::Waiting => "WAITING",
            JobState::Starting => "STARTING",
            JobState::Running => "RUNNING",
            JobState::Stopping => "STOPPING",
            JobState::Cleaning => "CLEANING",
            JobState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Audit entry for one (job, state) pair
///
/// Re-entering a state overwrites the existing record instead of adding a
/// second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub since: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Effect of a transition on the waiting queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueChange {
    /// Nothing to do
    Unchanged,
    /// Append the job: its rank becomes `max(rank of waiting jobs) + 1`
    Enqueue,
    /// Remove the job: every waiting job ranked above `vacated_rank` moves
    /// up by one and the job's own rank becomes 0
    Dequeue { vacated_rank: i32 },
}

/// A planned state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: JobState,
    pub to: JobState,
    pub queue: QueueChange,
}

impl Transition {
    /// Plans the move of a job from `from` (with its current `rank`) to `to`.
    ///
    /// Returns `None` when the job already is in `to`; such a request must
    /// leave the job and its audit history untouched.
    pub fn plan(from: JobState, rank: i32, to: JobState) -> Option<Self> {
        if from == to {
            return None;
        }

        let queue = match (from, to) {
            (_, JobState::Waiting) => QueueChange::Enqueue,
            (JobState::Waiting, _) => QueueChange::Dequeue { vacated_rank: rank },
            _ => QueueChange::Unchanged,
        };

        Some(Self { from, to, queue })
    }

    /// Whether applying this transition touches the waiting queue
    pub fn touches_queue(&self) -> bool {
        self.queue != QueueChange::Unchanged
    }

    /// Rank the job holds after the transition, given the highest rank
    /// currently held by a waiting job.
    pub fn next_rank(&self, current_rank: i32, max_waiting_rank: Option<i32>) -> i32 {
        match self.queue {
            QueueChange::Enqueue => max_waiting_rank.unwrap_or(0) + 1,
            QueueChange::Dequeue { .. } => 0,
            QueueChange::Unchanged => current_rank,
        }
    }
}
