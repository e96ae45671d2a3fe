use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Users and their groups
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            admin BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_groups (
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            group_id BIGINT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, group_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Jobs; `state` holds the lifecycle ordinal so state ranges are plain comparisons
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id),
            description TEXT NOT NULL,
            provisioning TEXT NOT NULL DEFAULT '',
            request TEXT NOT NULL,
            state SMALLINT NOT NULL,
            rank INTEGER NOT NULL DEFAULT 0,
            allocation TEXT,
            continues BIGINT REFERENCES jobs(id),
            archived_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_states (
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            state SMALLINT NOT NULL,
            since TIMESTAMPTZ NOT NULL,
            reason TEXT,
            UNIQUE (job_id, state)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Process topology
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS process_groups (
            id BIGSERIAL PRIMARY KEY,
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            idx INTEGER NOT NULL,
            UNIQUE (job_id, idx)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processes (
            id BIGSERIAL PRIMARY KEY,
            group_id BIGINT NOT NULL REFERENCES process_groups(id) ON DELETE CASCADE,
            idx INTEGER NOT NULL,
            node_id VARCHAR(255) NOT NULL,
            UNIQUE (group_id, idx)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id BIGSERIAL PRIMARY KEY,
            node_id VARCHAR(255) NOT NULL,
            kind VARCHAR(20) NOT NULL,
            idx INTEGER NOT NULL,
            UNIQUE (node_id, kind, idx)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS allocations (
            id BIGSERIAL PRIMARY KEY,
            process_id BIGINT NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
            resource_id BIGINT NOT NULL REFERENCES resources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS utilizations (
            allocation_id BIGINT NOT NULL REFERENCES allocations(id) ON DELETE CASCADE,
            kind VARCHAR(20) NOT NULL,
            aggregated DOUBLE PRECISION NOT NULL DEFAULT 0,
            samples BIGINT NOT NULL DEFAULT 0,
            current DOUBLE PRECISION NOT NULL DEFAULT 0,
            UNIQUE (allocation_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the scheduler's queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state_rank ON jobs(state, rank) WHERE archived_at IS NULL")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_process_groups_job_id ON process_groups(job_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_allocations_process_id ON allocations(process_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
