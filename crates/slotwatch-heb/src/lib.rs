// # H-E-B Availability Client
//
// This crate provides the H-E-B commerce API implementation of
// `AvailabilityClient` and `StoreLocator`.
//
// ## Responsibilities
//
// - One HTTP request per call; no retries, no caching
// - Non-2xx responses and transport failures map to `Error::Network`
// - Bodies without the expected shape map to `Error::Parse`
// - Polling cadence, timeouts per pass and alert state are owned by the engine
//
// ## Session
//
// The API trusts whatever session the caller already has. An optional cookie
// header can be supplied through configuration; it is never logged.
//
// ## API Reference
//
// - Slots: GET `/commerce-api/v1/timeslot/timeslots?store_id=..&days=15&fulfillment_type=pickup`
// - Store search: POST `/commerce-api/v1/store/locator/address`

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use slotwatch_core::traits::{AvailabilityClient, Slot, StoreLocator, StoreQuery};
use slotwatch_core::watch::{DisplayInfo, WatchEntry};
use slotwatch_core::{Error, Result};
use std::time::Duration;

/// Production API base URL
pub const HEB_API_BASE: &str = "https://www.heb.com";

const SLOTS_PATH: &str = "/commerce-api/v1/timeslot/timeslots";
const LOCATOR_PATH: &str = "/commerce-api/v1/store/locator/address";

/// Days of slots requested per query
const SLOT_DAYS: &str = "15";

/// Client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HebClientConfig {
    /// Base URL, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP timeout per request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cookie header sent with every request
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub cookie: Option<String>,
}

fn default_base_url() -> String {
    HEB_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HebClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            cookie: None,
        }
    }
}

impl HebClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "Base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("HTTP timeout must be > 0"));
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the cookie
impl std::fmt::Debug for HebClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HebClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("cookie", &self.cookie.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// H-E-B commerce API client
///
/// Stateless apart from the pooled HTTP connection; cheap to share behind an
/// `Arc`.
pub struct HebClient {
    base_url: String,
    cookie: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HebClient")
            .field("base_url", &self.base_url)
            .field("cookie", &self.cookie.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HebClient {
    /// Create a client from validated configuration
    pub fn new(config: HebClientConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.cookie,
            client,
        })
    }

    /// Client against the production API with default settings
    pub fn production() -> Result<Self> {
        Self::new(HebClientConfig::default())
    }

    fn with_session(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
            None => request,
        }
    }

    /// Send a request and return the JSON body of a 2xx response
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<serde_json::Value> {
        let response = self
            .with_session(request)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: HTTP request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), context, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| Error::parse(format!("{}: response is not JSON: {}", context, e)))
    }
}

/// Map a non-2xx status to a network error
fn status_error(status: u16, context: &str, body: &str) -> Error {
    let detail = match status {
        401 | 403 => "session rejected".to_string(),
        404 => "endpoint or store not found".to_string(),
        429 => "rate limited".to_string(),
        500..=599 => format!("server error (transient): {}", truncate(body, 200)),
        _ => format!("unexpected status: {}", truncate(body, 200)),
    };
    Error::network(format!("{}: HTTP {} {}", context, status, detail))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Deserialize)]
struct SlotsResponse {
    items: Vec<SlotItem>,
}

#[derive(Deserialize)]
struct SlotItem {
    date: String,
    timeslot: Timeslot,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timeslot {
    start_time: String,
    end_time: String,
}

#[derive(Deserialize)]
struct LocatorResponse {
    stores: Vec<LocatorResult>,
}

#[derive(Deserialize)]
struct LocatorResult {
    #[serde(default)]
    distance: f64,
    store: StoreDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDetails {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address1: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    postal_code: String,
}

/// Store ids come back as numbers or strings depending on the endpoint
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Parse a timeslots response body
pub fn parse_slots(body: serde_json::Value) -> Result<Vec<Slot>> {
    let response: SlotsResponse = serde_json::from_value(body)
        .map_err(|e| Error::parse(format!("Unexpected timeslots response: {}", e)))?;

    Ok(response
        .items
        .into_iter()
        .map(|item| Slot::new(item.date, item.timeslot.start_time, item.timeslot.end_time))
        .collect())
}

/// Parse a store-locator response body into unselected watch entries
pub fn parse_stores(body: serde_json::Value) -> Result<Vec<WatchEntry>> {
    let response: LocatorResponse = serde_json::from_value(body)
        .map_err(|e| Error::parse(format!("Unexpected store locator response: {}", e)))?;

    Ok(response
        .stores
        .into_iter()
        .map(|result| {
            let store = result.store;
            WatchEntry::new(
                store.id,
                DisplayInfo {
                    name: store.name,
                    address1: store.address1,
                    city: store.city,
                    state: store.state,
                    postal_code: store.postal_code,
                },
            )
            .with_distance(result.distance)
        })
        .collect())
}

#[async_trait]
impl AvailabilityClient for HebClient {
    /// Fetch pickup slots for one store
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /commerce-api/v1/timeslot/timeslots?store_id=590&days=15&fulfillment_type=pickup
    /// ```
    async fn fetch_slots(&self, location_id: &str) -> Result<Vec<Slot>> {
        tracing::debug!("Fetching slots for store {}", location_id);

        let request = self
            .client
            .get(format!("{}{}", self.base_url, SLOTS_PATH))
            .query(&[
                ("store_id", location_id),
                ("days", SLOT_DAYS),
                ("fulfillment_type", "pickup"),
            ]);

        let body = self
            .send_json(request, &format!("Slots for store {}", location_id))
            .await?;
        let slots = parse_slots(body)?;

        tracing::debug!("Store {} has {} slot(s)", location_id, slots.len());
        Ok(slots)
    }

    fn client_name(&self) -> &'static str {
        "heb"
    }
}

#[async_trait]
impl StoreLocator for HebClient {
    /// Search curbside stores near an address
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /commerce-api/v1/store/locator/address
    /// { "address": "...", "radius": 10, "curbsideOnly": true }
    /// ```
    async fn find_stores(&self, query: &StoreQuery) -> Result<Vec<WatchEntry>> {
        tracing::info!(
            "Searching stores within {} miles of {}",
            query.radius,
            query.address
        );

        let request = self
            .client
            .post(format!("{}{}", self.base_url, LOCATOR_PATH))
            .json(&serde_json::json!({
                "address": query.address,
                "radius": query.radius,
                "curbsideOnly": true,
            }));

        let body = self.send_json(request, "Store search").await?;
        let stores = parse_stores(body)?;

        tracing::info!("Store search returned {} store(s)", stores.len());
        Ok(stores)
    }
}
