//! Threshold alerts — "leaves in N min" exactly once per threshold per day.
//!
//! Each trip carries a row of fired flags, one per rung of the threshold
//! ladder. A tick fires every rung the trip has crossed and not yet fired,
//! but sends a single request naming the most urgent one. Once the departure
//! has passed, an edited row is cleared so tomorrow's occurrence alerts again.

use chrono::{Datelike, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::TripStore;
use tripbell_core::types::{TimeOfDay, Trip};

use crate::clock::Clock;
use crate::dispatch::{Request, RequestSender};

/// Seconds-before-departure alert points, most distant first.
pub const ALERT_THRESHOLDS: [u32; 9] = [3600, 1800, 900, 600, 300, 240, 180, 120, 60];

/// Strictly descending list of alert thresholds in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertLadder {
    thresholds: Arc<[u32]>,
}

impl AlertLadder {
    pub fn new(thresholds: &[u32]) -> Result<Self> {
        if thresholds.is_empty() {
            return Err(TripbellError::InvalidInput("alert ladder is empty".into()));
        }
        if thresholds.windows(2).any(|w| w[0] <= w[1]) || thresholds.contains(&0) {
            return Err(TripbellError::InvalidInput(format!(
                "alert ladder must be strictly descending and positive: {thresholds:?}"
            )));
        }
        Ok(Self {
            thresholds: thresholds.into(),
        })
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

impl Default for AlertLadder {
    fn default() -> Self {
        Self {
            thresholds: ALERT_THRESHOLDS.as_slice().into(),
        }
    }
}

/// Per-trip alert bookkeeping for the current occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripAlertState {
    /// One flag per ladder rung: already alerted today.
    pub fired: Vec<bool>,
    pub muted: bool,
    /// Changed since the last reset; cleared once the departure passes.
    pub edited: bool,
}

impl TripAlertState {
    fn new(rungs: usize) -> Self {
        Self {
            fired: vec![false; rungs],
            muted: false,
            edited: false,
        }
    }

    fn reset(&mut self) {
        self.fired.iter_mut().for_each(|f| *f = false);
        self.muted = false;
        self.edited = false;
    }
}

/// Alert state for every observed trip, keyed by trip id.
#[derive(Debug, Default)]
pub struct AlertBook {
    ladder: AlertLadder,
    states: HashMap<String, TripAlertState>,
}

impl AlertBook {
    pub fn new(ladder: AlertLadder) -> Self {
        Self {
            ladder,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, trip_id: &str) -> Option<&TripAlertState> {
        self.states.get(trip_id)
    }

    fn entry(&mut self, trip_id: &str) -> &mut TripAlertState {
        let rungs = self.ladder.len();
        self.states
            .entry(trip_id.to_string())
            .or_insert_with(|| TripAlertState::new(rungs))
    }

    pub fn mute(&mut self, trip_id: &str) {
        let state = self.entry(trip_id);
        state.muted = true;
        state.edited = true;
    }

    pub fn unmute(&mut self, trip_id: &str) {
        let state = self.entry(trip_id);
        state.muted = false;
        state.edited = true;
    }

    /// Evaluate one trip at local time `now`.
    ///
    /// Returns the request to send, if any rung fired on this call.
    pub fn evaluate(&mut self, trip: &Trip, now: NaiveDateTime) -> Option<Request> {
        if !trip.should_run(now.weekday()) {
            return None;
        }

        let current = TimeOfDay::from_naive(now.time()).seconds();
        let departure = trip.departure_time().seconds();
        let ladder = Arc::clone(&self.ladder.thresholds);
        let state = self.entry(&trip.id);

        if current > departure {
            if state.edited {
                state.reset();
                tracing::debug!(trip = %trip.id, "🔁 Alert state reset: '{}'", trip.name);
            }
            return None;
        }

        if state.muted {
            tracing::debug!(trip = %trip.id, "🔕 Muted: '{}'", trip.name);
            return None;
        }

        let diff = departure - current;
        let mut minutes_left = None;
        for (threshold, fired) in ladder.iter().zip(state.fired.iter_mut()) {
            if *threshold > diff && !*fired {
                *fired = true;
                state.edited = true;
                // Ladder is descending, so the last hit is the most urgent.
                minutes_left = Some(threshold / 60);
            }
        }

        let minutes = minutes_left?;
        tracing::debug!(
            trip = %trip.id,
            diff,
            "🔔 Alert fired: '{}' ({} min)",
            trip.name,
            minutes
        );
        Some(Request {
            user_id: trip.user_id.clone(),
            trip_id: trip.id.clone(),
            message: alert_message(&trip.name, minutes),
        })
    }

    /// Evaluate every trip; at most one request per trip.
    ///
    /// State for ids missing from `trips` is dropped afterwards.
    pub fn evaluate_all(&mut self, trips: &[Trip], now: NaiveDateTime) -> Vec<Request> {
        let requests: Vec<Request> = trips
            .iter()
            .filter_map(|trip| self.evaluate(trip, now))
            .collect();
        let known: HashSet<&str> = trips.iter().map(|t| t.id.as_str()).collect();
        self.states.retain(|id, _| known.contains(id.as_str()));
        requests
    }
}

pub fn alert_message(trip_name: &str, minutes: u32) -> String {
    format!("🔔 **Depart Soon:** **{trip_name}** leaves in **{minutes}** min!")
}

/// The ticked alert loop plus the mute API.
///
/// The book is shared between the loop and callers of [`Self::mute_trip`];
/// the lock is only taken for synchronous evaluation.
pub struct AlertScheduler {
    store: Arc<dyn TripStore>,
    sender: RequestSender,
    clock: Arc<dyn Clock>,
    book: Mutex<AlertBook>,
    interval: Duration,
}

impl AlertScheduler {
    pub fn new(
        store: Arc<dyn TripStore>,
        sender: RequestSender,
        clock: Arc<dyn Clock>,
        ladder: AlertLadder,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            book: Mutex::new(AlertBook::new(ladder)),
            interval,
        }
    }

    fn book(&self) -> MutexGuard<'_, AlertBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mute_trip(&self, trip_id: &str) {
        self.book().mute(trip_id);
        tracing::info!(trip = %trip_id, "🔕 Trip muted");
    }

    pub fn unmute_trip(&self, trip_id: &str) {
        self.book().unmute(trip_id);
        tracing::info!(trip = %trip_id, "🔔 Trip unmuted");
    }

    /// Snapshot of a trip's alert state.
    pub fn trip_state(&self, trip_id: &str) -> Option<TripAlertState> {
        self.book().state(trip_id).cloned()
    }

    /// One tick at local time `now`. Returns how many requests were queued.
    pub async fn tick_at(&self, now: NaiveDateTime) -> Result<usize> {
        let trips = self.store.get_all_trips().await?;
        let requests = self.book().evaluate_all(&trips, now);
        Ok(requests
            .into_iter()
            .filter(|request| self.sender.send(request.clone()))
            .count())
    }

    /// Tick every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("⏰ Alert scheduler started (check every {:?})", self.interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_at(self.clock.now()).await {
                        tracing::error!("❌ Failed to fetch trips: {e}");
                    }
                }
            }
        }

        tracing::info!("⏰ Alert scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::test_support::{MemoryStore, at, monday, sample_trip, sunday};

    fn ladder_900_600() -> AlertLadder {
        AlertLadder::new(&[900, 600]).unwrap()
    }

    #[test]
    fn test_ladder_validation() {
        assert!(AlertLadder::new(&[]).is_err());
        assert!(AlertLadder::new(&[600, 900]).is_err());
        assert!(AlertLadder::new(&[600, 600]).is_err());
        assert!(AlertLadder::new(&[60, 0]).is_err());
        assert_eq!(AlertLadder::default().thresholds(), ALERT_THRESHOLDS);
    }

    #[test]
    fn test_fires_each_threshold_once() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));

        // 07:46:00 → diff 840 → crosses 900.
        let first = book.evaluate(&trip, at(monday(), 7, 46, 0)).unwrap();
        assert!(first.message.contains("**15** min"));
        assert_eq!(first.user_id, "user-1");

        // Same window again: nothing new.
        assert!(book.evaluate(&trip, at(monday(), 7, 47, 0)).is_none());

        // 07:51:00 → diff 540 → crosses 600 only.
        let second = book.evaluate(&trip, at(monday(), 7, 51, 0)).unwrap();
        assert!(second.message.contains("**10** min"));
        assert!(book.evaluate(&trip, at(monday(), 7, 55, 0)).is_none());
    }

    #[test]
    fn test_nothing_before_first_threshold() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));
        // diff exactly 900 is not crossed yet.
        assert!(book.evaluate(&trip, at(monday(), 7, 45, 0)).is_none());
        assert!(book.evaluate(&trip, at(monday(), 6, 0, 0)).is_none());
    }

    #[test]
    fn test_catch_up_reports_most_urgent() {
        let mut book = AlertBook::new(AlertLadder::default());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));

        // Cold start 200s before departure: every rung from 3600 to 240 fires at once.
        let request = book.evaluate(&trip, at(monday(), 7, 56, 40)).unwrap();
        assert!(request.message.contains("**4** min"));

        let state = book.state("t1").unwrap();
        assert_eq!(
            state.fired,
            [true, true, true, true, true, true, false, false, false]
        );
        assert!(state.edited);
    }

    #[test]
    fn test_mute_suppresses_and_freezes() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));

        assert!(book.evaluate(&trip, at(monday(), 7, 46, 0)).is_some());
        book.mute("t1");

        // Crosses 600 while muted: no request, flag untouched.
        assert!(book.evaluate(&trip, at(monday(), 7, 51, 0)).is_none());
        assert_eq!(book.state("t1").unwrap().fired, [true, false]);

        book.unmute("t1");
        // Unmuted with 600 still clear: it fires now.
        let request = book.evaluate(&trip, at(monday(), 7, 52, 0)).unwrap();
        assert!(request.message.contains("**10** min"));
    }

    #[test]
    fn test_unmute_does_not_replay_fired_thresholds() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));

        assert!(book.evaluate(&trip, at(monday(), 7, 46, 0)).is_some());
        assert!(book.evaluate(&trip, at(monday(), 7, 51, 0)).is_some());
        book.mute("t1");
        assert!(book.evaluate(&trip, at(monday(), 7, 51, 30)).is_none());
        book.unmute("t1");
        // diff 480 < 600, but 600 already fired before the mute.
        assert!(book.evaluate(&trip, at(monday(), 7, 52, 0)).is_none());
    }

    #[test]
    fn test_mute_unknown_trip_creates_state() {
        let mut book = AlertBook::new(ladder_900_600());
        book.mute("fresh");
        let state = book.state("fresh").unwrap();
        assert!(state.muted);
        assert!(state.edited);
        assert_eq!(state.fired, [false, false]);

        book.unmute("other");
        assert!(!book.state("other").unwrap().muted);
    }

    #[test]
    fn test_reset_after_departure() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));

        book.evaluate(&trip, at(monday(), 7, 46, 0));
        book.evaluate(&trip, at(monday(), 7, 51, 0));
        book.mute("t1");

        // Departure passed with edited state: everything clears.
        assert!(book.evaluate(&trip, at(monday(), 8, 0, 1)).is_none());
        let state = book.state("t1").unwrap();
        assert_eq!(state.fired, [false, false]);
        assert!(!state.muted);
        assert!(!state.edited);

        // Armed again: the full ladder can fire on the next occurrence.
        let next_day = monday().succ_opt().unwrap();
        assert!(book.evaluate(&trip, at(next_day, 7, 46, 0)).is_some());
        assert!(book.evaluate(&trip, at(next_day, 7, 51, 0)).is_some());
    }

    #[test]
    fn test_untouched_state_after_departure_is_left_alone() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));
        assert!(book.evaluate(&trip, at(monday(), 9, 0, 0)).is_none());
        let state = book.state("t1").unwrap();
        assert!(!state.edited);
        assert_eq!(state.fired, [false, false]);
    }

    #[test]
    fn test_skips_days_outside_mask() {
        let mut book = AlertBook::new(ladder_900_600());
        let trip = sample_trip("t1", TimeOfDay::from_hms(8, 0, 0));
        // sample_trip runs on workdays only.
        assert!(book.evaluate(&trip, at(sunday(), 7, 46, 0)).is_none());
        assert!(book.state("t1").is_none());
    }

    #[test]
    fn test_one_request_per_trip_per_tick() {
        let mut book = AlertBook::new(AlertLadder::default());
        let trips = vec![
            sample_trip("a", TimeOfDay::from_hms(8, 0, 0)),
            sample_trip("b", TimeOfDay::from_hms(8, 30, 0)),
            sample_trip("c", TimeOfDay::from_hms(12, 0, 0)),
        ];
        let requests = book.evaluate_all(&trips, at(monday(), 7, 58, 30));
        let ids: Vec<_> = requests.iter().map(|r| r.trip_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(requests[0].message.contains("**2** min"));
        assert!(requests[1].message.contains("**60** min"));
    }

    #[test]
    fn test_state_dropped_for_trips_no_longer_stored() {
        let mut book = AlertBook::new(ladder_900_600());
        let kept = sample_trip("kept", TimeOfDay::from_hms(8, 0, 0));
        let deleted = sample_trip("deleted", TimeOfDay::from_hms(8, 0, 0));
        book.evaluate_all(&[kept.clone(), deleted], at(monday(), 7, 46, 0));
        book.mute("never-stored");
        assert!(book.state("deleted").is_some());

        book.evaluate_all(std::slice::from_ref(&kept), at(monday(), 7, 47, 0));
        assert!(book.state("deleted").is_none());
        assert!(book.state("never-stored").is_none());
        assert_eq!(book.state("kept").unwrap().fired, [true, false]);
    }

    #[tokio::test]
    async fn test_tick_queues_requests() {
        let store = Arc::new(MemoryStore::with_trips(vec![sample_trip(
            "t1",
            TimeOfDay::from_hms(8, 0, 0),
        )]));
        let dispatcher = Dispatcher::new(4);
        let scheduler = AlertScheduler::new(
            store,
            dispatcher.sender(),
            Arc::new(crate::LocalClock),
            ladder_900_600(),
            Duration::from_secs(30),
        );

        assert_eq!(scheduler.tick_at(at(monday(), 7, 46, 0)).await.unwrap(), 1);
        assert_eq!(scheduler.tick_at(at(monday(), 7, 47, 0)).await.unwrap(), 0);

        scheduler.mute_trip("t1");
        assert_eq!(scheduler.tick_at(at(monday(), 7, 51, 0)).await.unwrap(), 0);
        assert!(scheduler.trip_state("t1").unwrap().muted);
    }

    #[tokio::test]
    async fn test_tick_store_failure_is_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_listing(true);
        let scheduler = AlertScheduler::new(
            store,
            Dispatcher::new(4).sender(),
            Arc::new(crate::LocalClock),
            ladder_900_600(),
            Duration::from_secs(30),
        );
        assert!(scheduler.tick_at(at(monday(), 7, 46, 0)).await.is_err());
    }
}
