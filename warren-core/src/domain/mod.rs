//! Core domain types
//!
//! Jobs and their lifecycle, the process topology a job is scheduled onto,
//! and the physical nodes of the cluster. These are owned by the persistence
//! layer in the orchestrator and read by the scheduler and pit orchestrator.

pub mod job;
pub mod node;
pub mod summary;
pub mod topology;
pub mod user;
