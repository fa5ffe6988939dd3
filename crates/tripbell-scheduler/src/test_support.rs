//! In-memory collaborators for scheduler tests.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::{RoutingClient, TripStore};
use tripbell_core::types::{Itinerary, TimeOfDay, Trip, Weekdays};

use crate::clock::Clock;
use crate::dispatch::{Request, RequestHandler, handler_fn};

pub fn monday() -> NaiveDate {
    NaiveDate::from_isoywd_opt(2026, 42, Weekday::Mon).unwrap()
}

pub fn sunday() -> NaiveDate {
    NaiveDate::from_isoywd_opt(2026, 42, Weekday::Sun).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

/// A workday trip for `user-1` departing at `departure`.
pub fn sample_trip(id: &str, departure: TimeOfDay) -> Trip {
    Trip {
        id: id.into(),
        user_id: "user-1".into(),
        name: format!("Trip {id}"),
        from_id: "home".into(),
        from: "Home".into(),
        to_id: "office".into(),
        to: "Office".into(),
        time: departure.to_hms_string(),
        departure: true,
        weekdays: Weekdays::WORKDAYS,
        expected_itinerary: Itinerary {
            departure_time: departure,
            arrival_time: TimeOfDay(departure.seconds() + 1200),
            ..Default::default()
        },
    }
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A clock frozen at one instant.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self(Mutex::new(now))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Records every request it receives.
#[derive(Clone, Default)]
pub struct Collector {
    seen: Arc<Mutex<Vec<Request>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, name: &str) -> impl RequestHandler + 'static {
        let seen = Arc::clone(&self.seen);
        handler_fn(name, move |request| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(request);
                Ok(())
            }
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    trips: Mutex<Vec<Trip>>,
    updates: AtomicUsize,
    fail_listing: AtomicBool,
}

impl MemoryStore {
    pub fn with_trips(trips: Vec<Trip>) -> Self {
        Self {
            trips: Mutex::new(trips),
            ..Default::default()
        }
    }

    pub fn trips(&self) -> Vec<Trip> {
        self.trips.lock().unwrap().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn get_all_trips(&self) -> Result<Vec<Trip>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(TripbellError::Database("listing disabled".into()));
        }
        Ok(self.trips())
    }

    async fn get_trip(&self, user_id: &str, trip_id: &str) -> Result<Trip> {
        self.trips()
            .into_iter()
            .find(|t| t.id == trip_id && t.user_id == user_id)
            .ok_or_else(|| TripbellError::NotFound(trip_id.to_string()))
    }

    async fn update_trip(&self, trip: &Trip) -> Result<()> {
        let mut trips = self.trips.lock().unwrap();
        let slot = trips
            .iter_mut()
            .find(|t| t.id == trip.id)
            .ok_or_else(|| TripbellError::NotFound(trip.id.clone()))?;
        *slot = trip.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scriptable routing service.
pub struct FakeRouting {
    age: u32,
    departure: Mutex<TimeOfDay>,
    delay: Mutex<Duration>,
    fail_age: AtomicBool,
    fail_refresh: AtomicBool,
    failing_times: Mutex<HashSet<String>>,
    last_source_url: Mutex<Option<String>>,
    age_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    routing_calls: AtomicUsize,
}

impl FakeRouting {
    pub fn with_age(age: u32) -> Self {
        Self {
            age,
            departure: Mutex::new(TimeOfDay::from_hms(8, 0, 0)),
            delay: Mutex::new(Duration::ZERO),
            fail_age: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            failing_times: Mutex::new(HashSet::new()),
            last_source_url: Mutex::new(None),
            age_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            routing_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_departure(&self, departure: TimeOfDay) {
        *self.departure.lock().unwrap() = departure;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_age(&self, fail: bool) {
        self.fail_age.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Routing fails for requests targeting this time of day.
    pub fn fail_routing_at(&self, time: &str) {
        self.failing_times.lock().unwrap().insert(time.to_string());
    }

    pub fn last_source_url(&self) -> Option<String> {
        self.last_source_url.lock().unwrap().clone()
    }

    pub fn age_calls(&self) -> usize {
        self.age_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn routing_calls(&self) -> usize {
        self.routing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingClient for FakeRouting {
    async fn data_age(&self) -> Result<u32> {
        self.age_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_age.load(Ordering::SeqCst) {
            return Err(TripbellError::Routing("age unavailable".into()));
        }
        Ok(self.age)
    }

    async fn trigger_refresh(&self, source_url: &str) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_source_url.lock().unwrap() = Some(source_url.to_string());
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(TripbellError::Routing("refresh rejected".into()));
        }
        Ok(())
    }

    async fn routing(
        &self,
        from_id: &str,
        to_id: &str,
        time: &str,
        _departure: bool,
    ) -> Result<Itinerary> {
        self.routing_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing_times.lock().unwrap().contains(time) {
            return Err(TripbellError::Routing(format!("no route {from_id} → {to_id}")));
        }
        let departure = *self.departure.lock().unwrap();
        Ok(Itinerary {
            departure_time: departure,
            arrival_time: TimeOfDay(departure.seconds() + 900),
            ..Default::default()
        })
    }
}
