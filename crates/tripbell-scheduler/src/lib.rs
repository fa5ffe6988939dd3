//! # Tripbell Scheduler
//!
//! The trip-notification core: three cooperating loops sharing one
//! cancellation token.
//!
//! ## Architecture
//! ```text
//! TripWatcher
//!   ├── Dispatcher loop ── bounded queue (drop-on-full) → every RequestHandler
//!   ├── AlertScheduler (every 30s)
//!   │     └── trips for today × threshold ladder → one Request per trip per tick
//!   └── FreshnessMonitor (hourly, 06–08 local)
//!         └── stale data → trigger_refresh → re-route every trip concurrently
//! ```
//!
//! Alert state (fired thresholds, mute) lives in memory only and starts empty
//! after a restart.

pub mod alerts;
pub mod clock;
pub mod dispatch;
pub mod freshness;
pub mod notify;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use alerts::{ALERT_THRESHOLDS, AlertBook, AlertLadder, AlertScheduler, TripAlertState};
pub use clock::{Clock, LocalClock};
pub use dispatch::{Dispatcher, FnHandler, Request, RequestHandler, RequestSender, handler_fn};
pub use freshness::{CascadeReport, FreshnessMonitor, FreshnessOutcome, FreshnessPolicy};
pub use notify::{DiscordWebhookHandler, LogHandler, WebhookHandler};
pub use watcher::{TripWatcher, WatcherSettings};
