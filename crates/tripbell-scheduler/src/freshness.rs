//! Schedule-data freshness — reload stale upstream data and re-route every trip.
//!
//! Runs hourly but only acts inside the morning window, before most commutes.

use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tripbell_core::config::FreshnessConfig;
use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::{RoutingClient, TripStore};
use tripbell_core::types::Trip;

use crate::clock::Clock;

/// When to check, what counts as stale, and how long one trip may take to re-route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub stale_after_hours: u32,
    pub trip_refresh_timeout: Duration,
}

impl FreshnessPolicy {
    pub fn from_config(config: &FreshnessConfig) -> Self {
        Self {
            window_start_hour: config.window_start_hour,
            window_end_hour: config.window_end_hour,
            stale_after_hours: config.stale_after_hours,
            trip_refresh_timeout: Duration::from_secs(config.trip_refresh_timeout_secs),
        }
    }

    pub fn in_window(&self, hour: u32) -> bool {
        (self.window_start_hour..self.window_end_hour).contains(&hour)
    }

    /// Whole hours of age beyond the bound.
    pub fn is_stale(&self, age_secs: u32) -> bool {
        age_secs / 3600 > self.stale_after_hours
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&FreshnessConfig::default())
    }
}

/// Counts from one cascade refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub updated: usize,
    pub failed: usize,
}

/// Result of one freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshnessOutcome {
    OutsideWindow,
    AgeUnavailable,
    Fresh { age_hours: u32 },
    RefreshFailed,
    /// Upstream reloaded but the trips could not be listed.
    CascadeAborted,
    Refreshed(CascadeReport),
}

pub struct FreshnessMonitor {
    store: Arc<dyn TripStore>,
    routing: Arc<dyn RoutingClient>,
    clock: Arc<dyn Clock>,
    source_url: String,
    policy: FreshnessPolicy,
    interval: Duration,
}

impl FreshnessMonitor {
    pub fn new(
        store: Arc<dyn TripStore>,
        routing: Arc<dyn RoutingClient>,
        clock: Arc<dyn Clock>,
        source_url: &str,
        policy: FreshnessPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            routing,
            clock,
            source_url: source_url.to_string(),
            policy,
            interval,
        }
    }

    /// One check for local hour `hour`.
    pub async fn check_at(&self, hour: u32) -> FreshnessOutcome {
        if !self.policy.in_window(hour) {
            return FreshnessOutcome::OutsideWindow;
        }

        let age_secs = match self.routing.data_age().await {
            Ok(age) => age,
            Err(e) => {
                tracing::error!("❌ Failed to get data age: {e}");
                return FreshnessOutcome::AgeUnavailable;
            }
        };
        let age_hours = age_secs / 3600;
        tracing::debug!(age_hours, hour, "🕰️ Data age check");

        if !self.policy.is_stale(age_secs) {
            return FreshnessOutcome::Fresh { age_hours };
        }

        tracing::info!(age_hours, "♻️ Schedule data is stale, triggering refresh");
        if let Err(e) = self.routing.trigger_refresh(&self.source_url).await {
            tracing::error!("❌ Failed to trigger refresh: {e}");
            return FreshnessOutcome::RefreshFailed;
        }
        tracing::info!("✅ Schedule data refreshed");

        match self.refresh_all_trips().await {
            Ok(report) => FreshnessOutcome::Refreshed(report),
            Err(e) => {
                tracing::error!("❌ Failed to list trips for refresh: {e}");
                FreshnessOutcome::CascadeAborted
            }
        }
    }

    /// Re-route every trip concurrently and store the new itineraries.
    ///
    /// Only listing the trips can fail the whole cascade; per-trip failures
    /// are logged and counted.
    pub async fn refresh_all_trips(&self) -> Result<CascadeReport> {
        let trips = self.store.get_all_trips().await?;
        let mut tasks = JoinSet::new();

        for trip in trips {
            let store = Arc::clone(&self.store);
            let routing = Arc::clone(&self.routing);
            let timeout = self.policy.trip_refresh_timeout;
            tasks.spawn(async move {
                let name = trip.name.clone();
                match refresh_trip(store.as_ref(), routing.as_ref(), trip, timeout).await {
                    Ok(()) => {
                        tracing::info!("🔄 Updated trip '{name}'");
                        true
                    }
                    Err(e) => {
                        tracing::error!("❌ Failed to refresh trip '{name}': {e}");
                        false
                    }
                }
            });
        }

        let mut report = CascadeReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.updated += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    tracing::error!("❌ Trip refresh task panicked: {e}");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            updated = report.updated,
            failed = report.failed,
            "♻️ Cascade refresh finished"
        );
        Ok(report)
    }

    /// Check every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            "🗓️ Freshness monitor started (check every {:?}, window {:02}:00–{:02}:00)",
            self.interval,
            self.policy.window_start_hour,
            self.policy.window_end_hour
        );
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.check_at(self.clock.now().hour()).await;
                    tracing::debug!(?outcome, "🗓️ Freshness check done");
                }
            }
        }

        tracing::info!("🗓️ Freshness monitor stopped");
    }
}

async fn refresh_trip(
    store: &dyn TripStore,
    routing: &dyn RoutingClient,
    mut trip: Trip,
    timeout: Duration,
) -> Result<()> {
    let itinerary = tokio::time::timeout(
        timeout,
        routing.routing(&trip.from_id, &trip.to_id, &trip.time, trip.departure),
    )
    .await
    .map_err(|_| TripbellError::Timeout(format!("routing for trip {}", trip.id)))??;

    trip.expected_itinerary = itinerary;
    store.update_trip(&trip).await
}
