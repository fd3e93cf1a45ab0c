//! Configuration types for the slot monitor
//!
//! [`MonitorConfig`] is the user-editable "how often" setting persisted in the
//! config store. [`EngineConfig`] holds static engine settings supplied by
//! the embedding application.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default polling interval in minutes
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// Default store search radius in miles
pub const DEFAULT_RADIUS: u32 = 10;

/// Default number of search results kept in the watch-list
pub const DEFAULT_MAX_STORE: usize = 10;

/// Default number of slots rendered per store
pub const DEFAULT_MAX_SLOT: usize = 5;

/// Monitoring on/off switch and cadence
///
/// `interval_minutes` is only meaningful while `enabled` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_minutes: u32,
}

impl MonitorConfig {
    /// Monitoring enabled at the given cadence
    pub fn enabled(interval_minutes: u32) -> Self {
        Self {
            enabled: true,
            interval_minutes,
        }
    }

    /// Monitoring disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }

    /// Interpret an `updateMonitor` interval, where `interval <= 0` disables
    pub fn from_interval(interval: i64) -> Self {
        if interval <= 0 {
            return Self::disabled();
        }
        Self::enabled(u32::try_from(interval).unwrap_or(u32::MAX))
    }

    /// Reject an enabled config with a zero interval
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.enabled && self.interval_minutes == 0 {
            return Err(crate::Error::config(
                "Monitor interval must be at least 1 minute",
            ));
        }
        Ok(())
    }

    /// Tick period for the scheduler
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Display and search preferences owned by the foreground surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Search radius in miles
    pub radius: u32,
    /// Number of search results kept
    pub max_store: usize,
    /// Number of slots rendered per store
    pub max_slot: usize,
    /// Last searched address
    pub address: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            max_store: DEFAULT_MAX_STORE,
            max_slot: DEFAULT_MAX_SLOT,
            address: String::new(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler name the engine arms and disarms
    #[serde(default = "default_schedule_name")]
    pub schedule_name: String,

    /// Upper bound on a single slot query, in seconds
    ///
    /// A timed-out query is treated as a network failure.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Navigable reference for a location; `{id}` is replaced by the location id
    #[serde(default = "default_reference_template")]
    pub reference_template: String,

    /// Title used for availability alerts
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Optional icon attached to alerts
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.schedule_name.is_empty() {
            return Err(crate::Error::config("Schedule name cannot be empty"));
        }
        if self.query_timeout_secs == 0 {
            return Err(crate::Error::config("Query timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if !self.reference_template.contains("{id}") {
            return Err(crate::Error::config(
                "Reference template must contain an {id} placeholder",
            ));
        }
        Ok(())
    }

    /// Navigable reference for a location
    pub fn reference_for(&self, location_id: &str) -> String {
        self.reference_template.replace("{id}", location_id)
    }

    /// Query timeout as a duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule_name: default_schedule_name(),
            query_timeout_secs: default_query_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            reference_template: default_reference_template(),
            notification_title: default_notification_title(),
            icon_url: None,
        }
    }
}

fn default_schedule_name() -> String {
    "checkSlots".to_string()
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_reference_template() -> String {
    "https://www.heb.com/heb-store/{id}".to_string()
}

fn default_notification_title() -> String {
    "Curbside slot found!".to_string()
}
