//! User domain model

use serde::{Deserialize, Serialize};

/// A user who submits jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub admin: bool,
    /// Names of the groups the user belongs to; each has a shared directory
    pub groups: Vec<String>,
}
