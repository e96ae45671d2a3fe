//! Warren Orchestrator
//!
//! Startup order:
//! - Configuration from the environment
//! - Database pool and migrations
//! - Container host client, pit orchestrator, scheduler
//! - Startup recovery, then the scheduler loop, the cluster event loop,
//!   the pit monitor and the HTTP API until SIGTERM/SIGINT

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warren_client::{HttpTransport, LxdClient};
use warren_orchestrator::config::Config;
use warren_orchestrator::events::{ClusterEvents, Topic};
use warren_orchestrator::pits::PitOrchestrator;
use warren_orchestrator::repository::PgJobRepository;
use warren_orchestrator::reservations::UnrestrictedReservations;
use warren_orchestrator::scheduler::reconcile::monitor_pits;
use warren_orchestrator::scheduler::{Scheduler, SchedulerDeps};
use warren_orchestrator::scripts::ProcessScriptRunner;
use warren_orchestrator::{api, db, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warren_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Warren Orchestrator...");

    let config = load_config()?;
    info!(
        "Loaded configuration: {} node(s), control node {}",
        config.nodes.len(),
        config.nodes[0].id
    );

    // Create database connection pool
    info!("Connecting to database...");
    let pool = connect_with_retry(&config.database_url).await?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Container host client
    let cert = std::fs::read(&config.lxd_cert)
        .with_context(|| format!("Failed to read {}", config.lxd_cert.display()))?;
    let key = std::fs::read(&config.lxd_key)
        .with_context(|| format!("Failed to read {}", config.lxd_key.display()))?;
    let transport = HttpTransport::with_identity(
        &cert,
        &key,
        config.lxd_verify_server,
        config.lxd_request_timeout,
    )
    .context("Failed to set up container host client")?;
    let client = LxdClient::new(Arc::new(transport));

    let pits = Arc::new(
        PitOrchestrator::new(
            client,
            config.cluster()?,
            config.daemon_image.clone(),
            config.worker_image.clone(),
        )
        .with_state_timeout(config.lxd_timeout),
    );

    let scheduler = Scheduler::new(
        config.clone(),
        SchedulerDeps {
            repository: Arc::new(PgJobRepository::new(pool)),
            pits: Arc::clone(&pits),
            scripts: Arc::new(ProcessScriptRunner::new(&config.scripts_dir)),
            reservations: Arc::new(UnrestrictedReservations),
        },
    );

    info!("Recovering interrupted jobs");
    scheduler
        .startup()
        .await
        .context("Failed to recover jobs")?;

    let shutdown = shutdown::install_shutdown_handler()?;
    let events = Arc::new(ClusterEvents::new());

    let event_loop = tokio::spawn(
        Arc::clone(&scheduler).run_events(events.subscribe(&Topic::ALL), shutdown.clone()),
    );
    let monitor = tokio::spawn(monitor_pits(
        pits,
        Arc::clone(&events),
        config.pit_report_interval,
        shutdown.clone(),
    ));
    let tick_loop = tokio::spawn(Arc::clone(&scheduler).run(shutdown.clone()));

    // Build router with all API endpoints
    let app = api::create_router(scheduler);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("Server error")?;

    for (name, task) in [("scheduler", tick_loop), ("events", event_loop), ("monitor", monitor)] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("Warren Orchestrator stopped");
    Ok(())
}

/// Loads configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Connect to the database with retry and exponential backoff
///
/// The database may not accept connections yet when the orchestrator
/// starts (common in container environments).
async fn connect_with_retry(database_url: &str) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match db::create_pool(database_url).await {
            Ok(pool) => {
                info!("Database connection pool created after {} attempt(s)", attempt);
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to connect to database: {}", e));
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
