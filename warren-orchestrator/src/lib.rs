//! Warren Orchestrator
//!
//! Schedules compute jobs onto a cluster of container hosts. Each job runs
//! in a pit: a daemon container on the control node plus one worker
//! container per process, joined by an overlay network when the pit spans
//! several machines.
//!
//! - [`repository`]: persistence and the job state machine
//! - [`pits`]: creation and teardown of pits
//! - [`scheduler`]: the job lifecycle, periodic tick and reconciliation
//! - [`api`]: the HTTP status API

pub mod api;
pub mod config;
pub mod db;
pub mod events;
pub mod pits;
pub mod repository;
pub mod reservations;
pub mod scheduler;
pub mod scripts;
pub mod shutdown;
