//! Data Transfer Objects
//!
//! Lightweight request/response shapes used by the orchestrator's status API.

pub mod job;
