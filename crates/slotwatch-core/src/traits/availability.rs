// # Availability Client Trait
//
// Defines the interface for querying a single location's pickup slots, plus
// the store-locator collaborator that produces watch-list entries.
//
// ## Implementations
//
// - H-E-B commerce API: `slotwatch-heb` crate
//
// ## Usage
//
// ```rust,ignore
// use slotwatch_core::AvailabilityClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let client = /* AvailabilityClient implementation */;
//
//     let slots = client.fetch_slots("123").await?;
//     for slot in &slots {
//         println!("{}", slot.render());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::watch::WatchEntry;

/// One bookable pickup window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Calendar date as reported by the endpoint
    pub date: String,
    /// ISO-8601-like start timestamp
    pub start_time: String,
    /// ISO-8601-like end timestamp
    pub end_time: String,
}

impl Slot {
    /// Create a new slot
    pub fn new(
        date: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }

    /// Start time truncated to `HH:MM`
    pub fn start_hhmm(&self) -> &str {
        clock_part(&self.start_time)
    }

    /// End time truncated to `HH:MM`
    pub fn end_hhmm(&self) -> &str {
        clock_part(&self.end_time)
    }

    /// `"{date}: {HH:MM} - {HH:MM}"`
    pub fn render(&self) -> String {
        format!("{}: {} - {}", self.date, self.start_hhmm(), self.end_hhmm())
    }
}

/// Characters `[11, 16)` of a timestamp, or the whole string when shorter
fn clock_part(timestamp: &str) -> &str {
    timestamp.get(11..16).unwrap_or(timestamp)
}

/// Outcome of one location query, produced per tick and never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQueryResult {
    pub location_id: String,
    pub slots: Vec<Slot>,
    pub queried_at: DateTime<Utc>,
}

impl SlotQueryResult {
    /// Stamp a successful query with the current time
    pub fn new(location_id: impl Into<String>, slots: Vec<Slot>) -> Self {
        Self {
            location_id: location_id.into(),
            slots,
            queried_at: Utc::now(),
        }
    }

    /// Whether at least one slot is available
    pub fn has_slots(&self) -> bool {
        !self.slots.is_empty()
    }
}

/// Trait for slot availability queries
///
/// # Contract
///
/// - Stateless: no caching between calls, no retries, no backoff
/// - Single-shot: one request per invocation
/// - `Error::Network` on transport failure or a non-2xx response
/// - `Error::Parse` when the body lacks the expected shape
///
/// The engine treats both failure kinds as "unknown, not resolved" and
/// leaves that location's notification untouched for the current tick.
#[async_trait]
pub trait AvailabilityClient: Send + Sync {
    /// Fetch the available pickup slots for a location
    ///
    /// # Parameters
    ///
    /// - `location_id`: Store identifier
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Slot>)`: Available slots, possibly empty
    /// - `Err(Error)`: Network or parse failure
    async fn fetch_slots(&self, location_id: &str) -> Result<Vec<Slot>, crate::Error>;

    /// Get the client name (for logging/debugging)
    fn client_name(&self) -> &'static str;
}

/// Parameters of a store search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreQuery {
    /// Free-form address to search around
    pub address: String,
    /// Search radius in miles
    pub radius: u32,
}

/// Trait for store searches that seed the watch-list
#[async_trait]
pub trait StoreLocator: Send + Sync {
    /// Find curbside-capable stores near an address
    ///
    /// Results are returned in rank order and unselected.
    async fn find_stores(&self, query: &StoreQuery) -> Result<Vec<WatchEntry>, crate::Error>;
}
