//! Typed configuration store with defaults
//!
//! [`ConfigStore`] layers typed, default-on-miss access over a raw
//! [`StateStore`]. Reads never fail: an absent key, a `null` value, a value
//! of the wrong shape, or a backend fault all yield the caller's default.
//! Writes are fire-and-forget: a failed write is logged and dropped, since
//! configuration loss is recoverable by re-entry.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{
    DEFAULT_INTERVAL_MINUTES, DEFAULT_MAX_SLOT, DEFAULT_MAX_STORE, DEFAULT_RADIUS, MonitorConfig,
    Preferences,
};
use crate::traits::StateStore;
use crate::watch::{WatchEntry, WatchList, selected_entries};

/// Persisted key names
pub mod keys {
    /// Watch-list (sequence of watch entries)
    pub const STORE_RECORDS: &str = "storeRecords";
    /// Monitoring switch, 0 or 1
    pub const MONITOR: &str = "monitor";
    /// Polling interval in minutes
    pub const INTERVAL: &str = "interval";
    /// Search radius in miles
    pub const RADIUS: &str = "radius";
    /// Number of search results kept
    pub const MAX_STORE: &str = "maxStore";
    /// Number of slots rendered per store
    pub const MAX_SLOT: &str = "maxSlot";
    /// Last searched address
    pub const ADDRESS: &str = "address";
}

/// Typed view over a [`StateStore`]
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct ConfigStore {
    backend: Arc<dyn StateStore>,
}

impl ConfigStore {
    /// Wrap a raw state store
    pub fn new(backend: Arc<dyn StateStore>) -> Self {
        Self { backend }
    }

    /// Read `key`, falling back to `default`
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.load_raw(key).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Key [{}] has unexpected shape ({}), using default", key, e);
                    default
                }
            },
            None => default,
        }
    }

    /// Write `key`; failures are logged, not returned
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize value for key [{}]: {}", key, e);
                return;
            }
        };

        match self.backend.save(key, value).await {
            Ok(()) => debug!("Saved key [{}]", key),
            Err(e) => warn!("Failed to save key [{}]: {}", key, e),
        }
    }

    /// Read a non-negative integer that may have been stored as a string
    ///
    /// Zero is treated as absent.
    async fn get_count(&self, key: &str, default: u64) -> u64 {
        let parsed = match self.load_raw(key).await {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(other) => {
                warn!("Key [{}] is not a number: {}", key, other);
                None
            }
            None => None,
        };

        match parsed {
            Some(value) if value > 0 => value,
            _ => default,
        }
    }

    async fn load_raw(&self, key: &str) -> Option<Value> {
        match self.backend.load(key).await {
            Ok(Some(Value::Null)) | Ok(None) => {
                debug!("Key [{}] not found, using default", key);
                None
            }
            Ok(Some(value)) => Some(value),
            Err(e) => {
                warn!("Failed to load key [{}]: {}, using default", key, e);
                None
            }
        }
    }

    /// The full watch-list, in search-rank order
    pub async fn watch_list(&self) -> WatchList {
        self.get(keys::STORE_RECORDS, Vec::new()).await
    }

    /// Entries the monitor should poll
    pub async fn selected_watch_list(&self) -> WatchList {
        selected_entries(&self.watch_list().await)
    }

    /// Replace the watch-list wholesale (a new search overwrites the old one)
    pub async fn replace_watch_list(&self, entries: &[WatchEntry]) {
        self.set(keys::STORE_RECORDS, entries).await;
    }

    /// Select or deselect one location
    ///
    /// Returns `false` if no entry has that id.
    pub async fn set_selected(&self, location_id: &str, selected: bool) -> bool {
        let mut list = self.watch_list().await;
        let Some(entry) = list.iter_mut().find(|e| e.location_id == location_id) else {
            return false;
        };
        entry.selected = selected;
        self.replace_watch_list(&list).await;
        true
    }

    /// Persisted monitoring switch and interval
    pub async fn monitor_config(&self) -> MonitorConfig {
        let enabled = self.get_count(keys::MONITOR, 0).await != 0;
        let interval = self
            .get_count(keys::INTERVAL, u64::from(DEFAULT_INTERVAL_MINUTES))
            .await;

        MonitorConfig {
            enabled,
            interval_minutes: u32::try_from(interval).unwrap_or(DEFAULT_INTERVAL_MINUTES),
        }
    }

    /// Persist monitoring switch and interval
    pub async fn set_monitor_config(&self, config: &MonitorConfig) {
        self.set(keys::MONITOR, &u8::from(config.enabled)).await;
        if config.enabled {
            self.set(keys::INTERVAL, &config.interval_minutes).await;
        }
    }

    /// Display and search preferences
    pub async fn preferences(&self) -> Preferences {
        Preferences {
            radius: u32::try_from(self.get_count(keys::RADIUS, u64::from(DEFAULT_RADIUS)).await)
                .unwrap_or(DEFAULT_RADIUS),
            max_store: usize::try_from(
                self.get_count(keys::MAX_STORE, DEFAULT_MAX_STORE as u64).await,
            )
            .unwrap_or(DEFAULT_MAX_STORE),
            max_slot: usize::try_from(self.get_count(keys::MAX_SLOT, DEFAULT_MAX_SLOT as u64).await)
                .unwrap_or(DEFAULT_MAX_SLOT),
            address: self.get(keys::ADDRESS, String::new()).await,
        }
    }

    /// Persist display and search preferences
    pub async fn set_preferences(&self, preferences: &Preferences) {
        self.set(keys::RADIUS, &preferences.radius).await;
        self.set(keys::MAX_STORE, &preferences.max_store).await;
        self.set(keys::MAX_SLOT, &preferences.max_slot).await;
        self.set(keys::ADDRESS, &preferences.address).await;
    }

    /// Flush the backend
    pub async fn flush(&self) -> crate::Result<()> {
        self.backend.flush().await
    }
}
