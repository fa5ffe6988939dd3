//! Delivery sinks for alert requests.
//!
//! Each sink is a [`RequestHandler`]; register as many as needed on the
//! watcher. HTTP sinks treat any non-2xx status as a handler error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tripbell_core::error::{Result, TripbellError};
use tripbell_core::traits::TripStore;
use tripbell_core::types::{Itinerary, Leg, Trip};

use crate::dispatch::{Request, RequestHandler};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Discord rejects embed field values longer than this.
const EMBED_FIELD_LIMIT: usize = 1024;
const EMBED_COLOR: u32 = 0x3498DB;

/// Logs every request. Always registered by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait]
impl RequestHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, request: &Request) -> Result<()> {
        tracing::info!(
            user = %request.user_id,
            trip = %request.trip_id,
            "📣 {}",
            request.message
        );
        Ok(())
    }
}

async fn post_json(client: &reqwest::Client, url: &str, body: &serde_json::Value) -> Result<()> {
    let resp = client
        .post(url)
        .json(body)
        .timeout(SEND_TIMEOUT)
        .send()
        .await
        .map_err(|e| TripbellError::Handler(format!("Webhook send failed: {e}")))?;

    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(TripbellError::Handler(format!("Webhook error {status}: {body}")))
    }
}

/// POSTs `{user_id, trip_id, message, departure, arrival}` to a URL.
///
/// The trip is looked up to attach itinerary times; if the lookup fails the
/// times are sent as `null`.
pub struct WebhookHandler {
    client: reqwest::Client,
    url: String,
    store: Arc<dyn TripStore>,
}

impl WebhookHandler {
    pub fn new(url: &str, store: Arc<dyn TripStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            store,
        }
    }
}

#[async_trait]
impl RequestHandler for WebhookHandler {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn handle(&self, request: &Request) -> Result<()> {
        let itinerary = match self.store.get_trip(&request.user_id, &request.trip_id).await {
            Ok(trip) => Some(trip.expected_itinerary),
            Err(e) => {
                tracing::debug!(trip = %request.trip_id, "Trip lookup for webhook failed: {e}");
                None
            }
        };

        let payload = serde_json::json!({
            "user_id": request.user_id,
            "trip_id": request.trip_id,
            "message": request.message,
            "departure": itinerary.as_ref().map(|i| i.departure_time.to_hms_string()),
            "arrival": itinerary.as_ref().map(|i| i.arrival_time.to_hms_string()),
        });
        post_json(&self.client, &self.url, &payload).await?;
        tracing::debug!("✅ Webhook notification sent to {}", self.url);
        Ok(())
    }
}

/// Posts a Discord embed: the alert as title, one field per itinerary leg,
/// and the trip id in the footer so replies can be traced back to the trip.
pub struct DiscordWebhookHandler {
    client: reqwest::Client,
    webhook_url: String,
    store: Arc<dyn TripStore>,
}

impl DiscordWebhookHandler {
    pub fn new(webhook_url: &str, store: Arc<dyn TripStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.to_string(),
            store,
        }
    }
}

#[async_trait]
impl RequestHandler for DiscordWebhookHandler {
    fn name(&self) -> &str {
        "discord"
    }

    async fn handle(&self, request: &Request) -> Result<()> {
        let trip = self
            .store
            .get_trip(&request.user_id, &request.trip_id)
            .await?;
        post_json(&self.client, &self.webhook_url, &discord_payload(&request.message, &trip)).await?;
        tracing::info!("✅ Discord notification sent: {}", request.message);
        Ok(())
    }
}

fn discord_payload(title: &str, trip: &Trip) -> serde_json::Value {
    serde_json::json!({
        "embeds": [{
            "title": title,
            "color": EMBED_COLOR,
            "fields": itinerary_fields(&trip.expected_itinerary),
            "footer": { "text": format!("Tripbell • TripID: {}", trip.id) }
        }]
    })
}

fn itinerary_fields(itinerary: &Itinerary) -> Vec<serde_json::Value> {
    itinerary
        .legs
        .iter()
        .map(|leg| {
            serde_json::json!({
                "name": leg_title(leg),
                "value": leg_summary(leg),
                "inline": false,
            })
        })
        .collect()
}

fn mode_emoji(mode: &str) -> &'static str {
    match mode.to_ascii_lowercase().as_str() {
        "bus" => "🚌",
        "tram" => "🚋",
        "subway" | "metro" => "🚇",
        "rail" | "train" => "🚆",
        "ferry" => "⛴️",
        "walk" | "walking" => "🚶",
        _ => "🚏",
    }
}

fn leg_title(leg: &Leg) -> String {
    let line = leg.short_name.as_deref().unwrap_or(&leg.mode);
    let mut title = format!("{} {line}", mode_emoji(&leg.mode));
    if let Some(sign) = &leg.head_sign {
        title.push_str(&format!(" (Towards {sign})"));
    }
    title
}

fn leg_summary(leg: &Leg) -> String {
    let value = format!(
        "`{}` ➔ `{}`\n**Start:** {}\n**End:** {}",
        leg.departure_time, leg.arrival_time, leg.from.name, leg.to.name
    );
    if value.chars().count() <= EMBED_FIELD_LIMIT {
        return value;
    }
    let mut cut: String = value.chars().take(EMBED_FIELD_LIMIT - 3).collect();
    cut.push_str("...");
    cut
}
