//! Collaborator traits — the scheduler only sees trips and routing through these.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Itinerary, Trip};

/// Durable storage for trips.
///
/// Implementations must be safe to call from many tasks at once; the
/// freshness cascade updates trips concurrently.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Every trip of every user.
    async fn get_all_trips(&self) -> Result<Vec<Trip>>;

    /// A single trip owned by `user_id`. Missing trips are `NotFound`.
    async fn get_trip(&self, user_id: &str, trip_id: &str) -> Result<Trip>;

    /// Persist changes to an existing trip.
    async fn update_trip(&self, trip: &Trip) -> Result<()>;
}

/// Upstream routing and schedule-data service.
#[async_trait]
pub trait RoutingClient: Send + Sync {
    /// Age of the loaded schedule data, in seconds.
    async fn data_age(&self) -> Result<u32>;

    /// Ask the service to reload its schedule data from `source_url`.
    async fn trigger_refresh(&self, source_url: &str) -> Result<()>;

    /// Route between two locations for a target time of day.
    /// `departure` selects "depart at" (true) or "arrive by" (false).
    async fn routing(
        &self,
        from_id: &str,
        to_id: &str,
        time: &str,
        departure: bool,
    ) -> Result<Itinerary>;
}
