//! Warren Core
//!
//! Core types shared by the warren scheduler crates.
//!
//! This crate contains:
//! - Domain types: jobs, lifecycle states, process topology, cluster nodes
//! - DTOs: request/response shapes exchanged with the status API

pub mod domain;
pub mod dto;
