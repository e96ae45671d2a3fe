//! Job Repository
//!
//! Postgres implementation of [`JobRepository`].
//!
//! Transitions lock the job row (`SELECT ... FOR UPDATE`). Transitions that
//! enter or leave WAITING additionally hold a transaction-scoped advisory
//! lock on the waiting queue, taken before the row lock, so that concurrent
//! enqueues and dequeues cannot hand out duplicate ranks or leave gaps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use warren_core::domain::job::{Job, JobId, JobState, QueueChange, StateRecord, Transition};
use warren_core::domain::summary::JobSummary;
use warren_core::domain::topology::{
    Allocation, Process, ProcessGroup, Resource, ResourceKind, Utilization,
};
use warren_core::domain::user::User;
use warren_core::dto::job::CreateJob;

use super::{JobRepository, RepositoryError, Result};

/// Advisory lock key guarding the ranks of the waiting queue
const WAITING_QUEUE_LOCK: i64 = 0x7761_7272_656e;

const JOB_SELECT: &str = r#"
    SELECT j.id, j.user_id, j.description, j.provisioning, j.request, j.state, j.rank,
           j.allocation, j.continues, s.since
    FROM jobs j
    LEFT JOIN job_states s ON s.job_id = j.id AND s.state = j.state
"#;

#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_job(conn: &mut PgConnection, id: JobId) -> Result<Job> {
        let sql = format!("{} WHERE j.id = $1", JOB_SELECT);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::JobNotFound(id))?;

        row.try_into()
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, req: CreateJob) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO jobs (user_id, description, provisioning, request, state, rank, continues)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING id
            "#,
        )
        .bind(req.user_id)
        .bind(&req.description)
        .bind(&req.provisioning)
        .bind(&req.request)
        .bind(JobState::New.as_i16())
        .bind(req.continues)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO job_states (job_id, state, since) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(JobState::New.as_i16())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let job = Self::fetch_job(&mut tx, id).await?;
        tx.commit().await?;

        info!(job_id = id, "Job created");
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("{} WHERE j.id = $1 AND j.archived_at IS NULL", JOB_SELECT);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let sql = format!(
            "{} WHERE j.state = $1 AND j.archived_at IS NULL ORDER BY j.rank ASC, j.id ASC",
            JOB_SELECT
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(state.as_i16())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn find_by_state_range(&self, from: JobState, to: JobState) -> Result<Vec<Job>> {
        let sql = format!(
            "{} WHERE j.state BETWEEN $1 AND $2 AND j.archived_at IS NULL ORDER BY j.id ASC",
            JOB_SELECT
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(from.as_i16())
            .bind(to.as_i16())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn find_waiting_head(&self) -> Result<Option<Job>> {
        let sql = format!(
            "{} WHERE j.state = $1 AND j.rank = 1 AND j.archived_at IS NULL",
            JOB_SELECT
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(JobState::Waiting.as_i16())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn set_state(&self, id: JobId, state: JobState, reason: Option<String>) -> Result<Job> {
        let (peeked,): (i16,) = sqlx::query_as("SELECT state FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::JobNotFound(id))?;

        let waiting = JobState::Waiting.as_i16();
        let mut queue_locked = peeked == waiting || state == JobState::Waiting;

        loop {
            // Dropping `tx` on an early return rolls everything back
            let mut tx = self.pool.begin().await?;

            if queue_locked {
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(WAITING_QUEUE_LOCK)
                    .execute(&mut *tx)
                    .await?;
            }

            let (current, rank): (i16, i32) =
                sqlx::query_as("SELECT state, rank FROM jobs WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(RepositoryError::JobNotFound(id))?;
            let current = decode_state(current)?;

            let Some(transition) = Transition::plan(current, rank, state) else {
                let job = Self::fetch_job(&mut tx, id).await?;
                tx.commit().await?;
                return Ok(job);
            };

            if transition.touches_queue() && !queue_locked {
                // The job entered WAITING after we peeked; redo with the queue lock held
                tx.rollback().await?;
                queue_locked = true;
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO job_states (job_id, state, since, reason)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (job_id, state) DO UPDATE SET
                    since = EXCLUDED.since,
                    reason = EXCLUDED.reason
                "#,
            )
            .bind(id)
            .bind(state.as_i16())
            .bind(Utc::now())
            .bind(&reason)
            .execute(&mut *tx)
            .await?;

            let max_rank = match transition.queue {
                QueueChange::Enqueue => {
                    sqlx::query_scalar::<_, Option<i32>>(
                        "SELECT MAX(rank) FROM jobs WHERE state = $1 AND archived_at IS NULL",
                    )
                    .bind(waiting)
                    .fetch_one(&mut *tx)
                    .await?
                }
                QueueChange::Dequeue { vacated_rank } => {
                    sqlx::query(
                        r#"
                        UPDATE jobs SET rank = rank - 1
                        WHERE state = $1 AND rank > $2 AND id <> $3
                        "#,
                    )
                    .bind(waiting)
                    .bind(vacated_rank)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    None
                }
                QueueChange::Unchanged => None,
            };

            sqlx::query("UPDATE jobs SET state = $1, rank = $2 WHERE id = $3")
                .bind(state.as_i16())
                .bind(transition.next_rank(rank, max_rank))
                .bind(id)
                .execute(&mut *tx)
                .await?;

            let job = Self::fetch_job(&mut tx, id).await?;
            tx.commit().await?;

            info!(job_id = id, from = %transition.from, to = %transition.to, rank = job.rank, "Job state changed");
            return Ok(job);
        }
    }

    async fn state_history(&self, id: JobId) -> Result<Vec<StateRecord>> {
        let rows = sqlx::query_as::<_, StateRow>(
            r#"
            SELECT job_id, state, since, reason
            FROM job_states
            WHERE job_id = $1
            ORDER BY state ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StateRecord::try_from).collect()
    }

    async fn set_allocation(&self, id: JobId, allocation: Option<String>) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET allocation = $1 WHERE id = $2")
            .bind(allocation)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::JobNotFound(id));
        }
        Ok(())
    }

    async fn archive(&self, id: JobId) -> Result<()> {
        sqlx::query("UPDATE jobs SET archived_at = $1 WHERE id = $2 AND archived_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(job_id = id, "Job archived");
        Ok(())
    }

    async fn process_topology(&self, id: JobId) -> Result<Vec<ProcessGroup>> {
        let rows = sqlx::query_as::<_, TopologyRow>(
            r#"
            SELECT g.idx AS group_index, p.idx AS process_index, p.node_id,
                   a.id AS allocation_id, r.id AS resource_id, r.node_id AS resource_node,
                   r.kind AS resource_kind, r.idx AS resource_index
            FROM process_groups g
            JOIN processes p ON p.group_id = g.id
            LEFT JOIN allocations a ON a.process_id = p.id
            LEFT JOIN resources r ON r.id = a.resource_id
            WHERE g.job_id = $1
            ORDER BY g.idx ASC, p.idx ASC, a.id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let utilizations = sqlx::query_as::<_, UtilizationRow>(
            r#"
            SELECT u.allocation_id, u.kind, u.aggregated, u.samples, u.current
            FROM utilizations u
            JOIN allocations a ON a.id = u.allocation_id
            JOIN processes p ON p.id = a.process_id
            JOIN process_groups g ON g.id = p.group_id
            WHERE g.job_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        assemble_topology(rows, utilizations)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.name, u.admin,
                   COALESCE(array_agg(g.name ORDER BY g.name) FILTER (WHERE g.name IS NOT NULL), '{}')::TEXT[] AS groups
            FROM users u
            LEFT JOIN user_groups ug ON ug.user_id = u.id
            LEFT JOIN groups g ON g.id = ug.group_id
            WHERE u.id = $1
            GROUP BY u.id, u.name, u.admin
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            name: r.name,
            admin: r.admin,
            groups: r.groups,
        }))
    }

    async fn summaries(&self) -> Result<Vec<JobSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT j.id, j.user_id, j.description, j.state, j.rank, s.since,
                   COALESCE(SUM(uc.aggregated), 0)::DOUBLE PRECISION AS util_compute,
                   COALESCE(SUM(uc.samples), 0)::BIGINT AS util_compute_samples,
                   COALESCE(SUM(um.aggregated), 0)::DOUBLE PRECISION AS util_memory,
                   COALESCE(SUM(um.samples), 0)::BIGINT AS util_memory_samples,
                   AVG(uc.current) AS current_util_compute,
                   AVG(um.current) AS current_util_memory
            FROM jobs j
            LEFT JOIN job_states s ON s.job_id = j.id AND s.state = j.state
            LEFT JOIN process_groups g ON g.job_id = j.id
            LEFT JOIN processes p ON p.group_id = g.id
            LEFT JOIN allocations a ON a.process_id = p.id
            LEFT JOIN utilizations uc ON uc.allocation_id = a.id AND uc.kind = 'compute'
            LEFT JOIN utilizations um ON um.allocation_id = a.id AND um.kind = 'memory'
            WHERE j.archived_at IS NULL
            GROUP BY j.id, s.since
            ORDER BY j.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobSummary::try_from).collect()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn decode_state(value: i16) -> Result<JobState> {
    JobState::from_i16(value).ok_or_else(|| RepositoryError::Corrupt(format!("unknown job state {}", value)))
}

fn decode_kind(value: &str) -> Result<ResourceKind> {
    value.parse().map_err(RepositoryError::Corrupt)
}

/// Folds the flat join rows (ordered by group, process, allocation) into
/// the nested topology.
fn assemble_topology(
    rows: Vec<TopologyRow>,
    utilizations: Vec<UtilizationRow>,
) -> Result<Vec<ProcessGroup>> {
    let mut groups: Vec<ProcessGroup> = Vec::new();

    for row in rows {
        if groups.last().map(|g| g.index) != Some(row.group_index) {
            groups.push(ProcessGroup {
                index: row.group_index,
                processes: Vec::new(),
            });
        }
        let Some(group) = groups.last_mut() else {
            continue;
        };

        if group.processes.last().map(|p| p.index) != Some(row.process_index) {
            group.processes.push(Process {
                index: row.process_index,
                node_id: row.node_id.clone(),
                allocations: Vec::new(),
            });
        }
        let Some(process) = group.processes.last_mut() else {
            continue;
        };

        if let (Some(allocation_id), Some(resource_id), Some(kind), Some(index)) = (
            row.allocation_id,
            row.resource_id,
            row.resource_kind.as_deref(),
            row.resource_index,
        ) {
            let utilizations = utilizations
                .iter()
                .filter(|u| u.allocation_id == allocation_id)
                .map(|u| {
                    Ok(Utilization {
                        kind: decode_kind(&u.kind)?,
                        aggregated: u.aggregated,
                        samples: u.samples,
                        current: u.current,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            process.allocations.push(Allocation {
                id: allocation_id,
                resource: Resource {
                    id: resource_id,
                    node_id: row.resource_node.unwrap_or_else(|| row.node_id.clone()),
                    kind: decode_kind(kind)?,
                    index,
                },
                utilizations,
            });
        }
    }

    Ok(groups)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    user_id: i64,
    description: String,
    provisioning: String,
    request: String,
    state: i16,
    rank: i32,
    allocation: Option<String>,
    continues: Option<i64>,
    since: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            user_id: row.user_id,
            description: row.description,
            provisioning: row.provisioning,
            request: row.request,
            state: decode_state(row.state)?,
            rank: row.rank,
            allocation: row.allocation,
            continues: row.continues,
            since: row.since,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StateRow {
    job_id: i64,
    state: i16,
    since: DateTime<Utc>,
    reason: Option<String>,
}

impl TryFrom<StateRow> for StateRecord {
    type Error = RepositoryError;

    fn try_from(row: StateRow) -> Result<Self> {
        Ok(StateRecord {
            job_id: row.job_id,
            state: decode_state(row.state)?,
            since: row.since,
            reason: row.reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TopologyRow {
    group_index: i32,
    process_index: i32,
    node_id: String,
    allocation_id: Option<i64>,
    resource_id: Option<i64>,
    resource_node: Option<String>,
    resource_kind: Option<String>,
    resource_index: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct UtilizationRow {
    allocation_id: i64,
    kind: String,
    aggregated: f64,
    samples: i64,
    current: f64,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    admin: bool,
    groups: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    user_id: i64,
    description: String,
    state: i16,
    rank: i32,
    since: Option<DateTime<Utc>>,
    util_compute: f64,
    util_compute_samples: i64,
    util_memory: f64,
    util_memory_samples: i64,
    current_util_compute: Option<f64>,
    current_util_memory: Option<f64>,
}

impl TryFrom<SummaryRow> for JobSummary {
    type Error = RepositoryError;

    fn try_from(row: SummaryRow) -> Result<Self> {
        Ok(JobSummary {
            id: row.id,
            user_id: row.user_id,
            description: row.description,
            state: decode_state(row.state)?,
            rank: row.rank,
            since: row.since,
            util_compute: row.util_compute,
            util_compute_samples: row.util_compute_samples,
            util_memory: row.util_memory,
            util_memory_samples: row.util_memory_samples,
            current_util_compute: row.current_util_compute,
            current_util_memory: row.current_util_memory,
        })
    }
}
