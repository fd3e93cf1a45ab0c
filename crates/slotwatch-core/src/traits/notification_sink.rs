// # Notification Sink Trait
//
// Defines the interface for user-visible alerts with at most one live alert
// per key.
//
// ## Key vs Reference
//
// A notification is addressed by a stable opaque [`NotificationKey`] used for
// identity and deduplication. The navigable URL opened when the user acts on
// the alert travels separately in [`NotificationContent::reference`].
//
// ## Implementations
//
// - In-memory with tracing output: `notify::MemoryNotificationSink`
// - Chat webhook: `slotwatch-notify-webhook` crate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a notification record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    /// Create a key from an arbitrary identifier
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a monitored location's availability alert
    pub fn for_location(location_id: &str) -> Self {
        Self(format!("slots:{location_id}"))
    }

    /// Key for a one-off alert unrelated to monitoring
    pub fn adhoc(sequence: u64) -> Self {
        Self(format!("adhoc:{sequence}"))
    }

    /// The key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to one live notification record
///
/// The serial changes every time the record under `key` is replaced, so a
/// handle taken before a replacement no longer matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationHandle {
    pub key: NotificationKey,
    pub serial: u64,
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.serial)
    }
}

/// What the user sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Navigable reference opened on activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl NotificationContent {
    /// Create content with a title and message
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            icon_url: None,
            reference: None,
        }
    }

    /// Attach a navigable reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attach an icon
    pub fn with_icon(mut self, icon_url: Option<String>) -> Self {
        self.icon_url = icon_url;
        self
    }
}

/// Trait for notification sinks
///
/// # Invariant
///
/// At most one live record exists per key at any time:
/// - `notify` on a key with a live record replaces it (never stacks)
/// - `clear` removes the record if present and is a no-op otherwise
/// - `activate` returns the record's reference and removes the record
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Create or replace the live record for `key`
    ///
    /// # Returns
    ///
    /// - `Ok(NotificationHandle)`: Handle to the (new) live record
    /// - `Err(Error)`: Delivery failed; the previous record, if any, is kept
    async fn notify(
        &self,
        key: &NotificationKey,
        content: &NotificationContent,
    ) -> Result<NotificationHandle, crate::Error>;

    /// Remove the live record for `key`
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: A record was removed
    /// - `Ok(false)`: No record existed
    async fn clear(&self, key: &NotificationKey) -> Result<bool, crate::Error>;

    /// Handle user activation of a notification
    ///
    /// The record is cleared; an alert, once acted on, does not linger.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(reference))`: The reference to open
    /// - `Ok(None)`: The handle is stale or the record carried no reference
    async fn activate(&self, handle: &NotificationHandle) -> Result<Option<String>, crate::Error>;

    /// Number of live records
    async fn live_count(&self) -> usize;

    /// Get the sink name (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}
