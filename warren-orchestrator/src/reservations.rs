//! Reservation service
//!
//! Decides whether the cluster can host a job's resource request. The
//! decision algorithm lives outside the scheduler; this is its contract.

use async_trait::async_trait;
use warren_core::domain::user::User;

#[async_trait]
pub trait Reservations: Send + Sync {
    /// Whether `request` could ever be satisfied by the current cluster
    async fn can_allocate(&self, request: &str, user: &User) -> bool;

    /// Reserves resources for `request` now, returning the allocation
    /// descriptor, or `None` if the resources are not free at the moment
    async fn reserve_cluster(&self, request: &str, user: &User) -> Option<String>;
}

/// Grants every request as-is; for clusters without a resource manager
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedReservations;

#[async_trait]
impl Reservations for UnrestrictedReservations {
    async fn can_allocate(&self, _request: &str, _user: &User) -> bool {
        true
    }

    async fn reserve_cluster(&self, request: &str, _user: &User) -> Option<String> {
        Some(request.to_string())
    }
}
