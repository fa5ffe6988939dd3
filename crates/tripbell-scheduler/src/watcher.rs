//! Lifecycle controller — wires the dispatcher, alert loop and freshness
//! loop together and starts/stops them as one unit.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tripbell_core::config::TripbellConfig;
use tripbell_core::error::Result;
use tripbell_core::traits::{RoutingClient, TripStore};

use crate::alerts::{AlertLadder, AlertScheduler, TripAlertState};
use crate::clock::{Clock, LocalClock};
use crate::dispatch::{Dispatcher, Request, RequestHandler, RequestSender};
use crate::freshness::{CascadeReport, FreshnessMonitor, FreshnessPolicy};

/// Everything the watcher needs besides its collaborators.
#[derive(Clone)]
pub struct WatcherSettings {
    pub alert_interval: Duration,
    pub freshness_interval: Duration,
    pub queue_capacity: usize,
    pub ladder: AlertLadder,
    pub policy: FreshnessPolicy,
    /// Feed URL handed to the routing service on refresh.
    pub source_url: String,
    pub await_handlers_on_stop: bool,
    pub clock: Arc<dyn Clock>,
}

impl WatcherSettings {
    pub fn from_config(config: &TripbellConfig) -> Self {
        Self {
            alert_interval: Duration::from_secs(config.scheduler.alert_interval_secs),
            freshness_interval: Duration::from_secs(config.freshness.interval_secs),
            queue_capacity: config.scheduler.queue_capacity,
            ladder: AlertLadder::default(),
            policy: FreshnessPolicy::from_config(&config.freshness),
            source_url: config.routing.source_url.clone(),
            await_handlers_on_stop: config.scheduler.await_handlers_on_stop,
            clock: Arc::new(LocalClock),
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self::from_config(&TripbellConfig::default())
    }
}

/// Owns the three loops. Register handlers, `start()`, and later `stop()`.
pub struct TripWatcher {
    /// `Some` until started; the dispatch loop takes ownership.
    dispatcher: Option<Dispatcher>,
    sender: RequestSender,
    alerts: Arc<AlertScheduler>,
    freshness: Arc<FreshnessMonitor>,
    cancel: CancellationToken,
    handler_tasks: TaskTracker,
    loops: Vec<JoinHandle<()>>,
    await_handlers_on_stop: bool,
}

impl TripWatcher {
    pub fn new(
        store: Arc<dyn TripStore>,
        routing: Arc<dyn RoutingClient>,
        settings: WatcherSettings,
    ) -> Self {
        let dispatcher = Dispatcher::new(settings.queue_capacity);
        let sender = dispatcher.sender();
        let alerts = AlertScheduler::new(
            Arc::clone(&store),
            sender.clone(),
            Arc::clone(&settings.clock),
            settings.ladder,
            settings.alert_interval,
        );
        let freshness = FreshnessMonitor::new(
            store,
            routing,
            settings.clock,
            &settings.source_url,
            settings.policy,
            settings.freshness_interval,
        );

        Self {
            dispatcher: Some(dispatcher),
            sender,
            alerts: Arc::new(alerts),
            freshness: Arc::new(freshness),
            cancel: CancellationToken::new(),
            handler_tasks: TaskTracker::new(),
            loops: Vec::new(),
            await_handlers_on_stop: settings.await_handlers_on_stop,
        }
    }

    /// Register a delivery sink. Ignored (with a warning) once started.
    pub fn add_handler<H: RequestHandler + 'static>(&mut self, handler: H) {
        match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.add_handler(handler),
            None => tracing::warn!(
                "⚠️ Handler '{}' registered after start, ignoring",
                handler.name()
            ),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.dispatcher.as_ref().map_or(0, Dispatcher::handler_count)
    }

    /// Enqueue a request without waiting. `false` means it was dropped.
    pub fn send_request(&self, request: Request) -> bool {
        self.sender.send(request)
    }

    pub fn mute_trip(&self, trip_id: &str) {
        self.alerts.mute_trip(trip_id);
    }

    pub fn unmute_trip(&self, trip_id: &str) {
        self.alerts.unmute_trip(trip_id);
    }

    pub fn trip_state(&self, trip_id: &str) -> Option<TripAlertState> {
        self.alerts.trip_state(trip_id)
    }

    pub fn dropped_count(&self) -> u64 {
        self.sender.dropped_count()
    }

    /// Run the re-route cascade now, outside the freshness window.
    pub async fn refresh_all_trips(&self) -> Result<CascadeReport> {
        self.freshness.refresh_all_trips().await
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_none() && !self.cancel.is_cancelled()
    }

    /// Launch all loops. A second call does nothing.
    pub fn start(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            tracing::warn!("⚠️ Trip watcher already started");
            return;
        };

        tracing::info!("🚀 Trip watcher starting");
        self.loops.push(tokio::spawn(
            dispatcher.run(self.cancel.clone(), self.handler_tasks.clone()),
        ));
        self.loops.push(tokio::spawn(
            Arc::clone(&self.alerts).run(self.cancel.clone()),
        ));
        self.loops.push(tokio::spawn(
            Arc::clone(&self.freshness).run(self.cancel.clone()),
        ));
    }

    /// Cancel every loop and wait for them to exit.
    ///
    /// In-flight handler tasks are only awaited when
    /// `await_handlers_on_stop` is set.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for handle in self.loops.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("❌ Watcher loop panicked: {e}");
            }
        }

        self.handler_tasks.close();
        if self.await_handlers_on_stop && !self.handler_tasks.is_empty() {
            tracing::info!(
                "⏳ Waiting for {} notification handlers",
                self.handler_tasks.len()
            );
            self.handler_tasks.wait().await;
        }
        tracing::info!("🛑 Trip watcher stopped");
    }
}

impl Drop for TripWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
