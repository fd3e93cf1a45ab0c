// # Memory Notification Sink
//
// Keeps live notification records in a map and reports every change through
// tracing.
//
// ## Purpose
//
// Default sink for the daemon when no external target is configured, and the
// reference implementation for the one-live-record-per-key contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Error;
use crate::traits::{NotificationContent, NotificationHandle, NotificationKey, NotificationSink};

#[derive(Debug, Clone)]
struct LiveRecord {
    serial: u64,
    content: NotificationContent,
}

/// Notification sink holding live records in memory
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    records: RwLock<HashMap<NotificationKey, LiveRecord>>,
    next_serial: AtomicU64,
}

impl MemoryNotificationSink {
    /// Create a sink with no live records
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of the live record under `key`, if any
    pub async fn content(&self, key: &NotificationKey) -> Option<NotificationContent> {
        self.records
            .read()
            .await
            .get(key)
            .map(|record| record.content.clone())
    }

    /// Keys with a live record, sorted
    pub async fn live_keys(&self) -> Vec<NotificationKey> {
        let mut keys: Vec<_> = self.records.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(
        &self,
        key: &NotificationKey,
        content: &NotificationContent,
    ) -> Result<NotificationHandle, Error> {
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.records.write().await.insert(
            key.clone(),
            LiveRecord {
                serial,
                content: content.clone(),
            },
        );

        match previous {
            Some(previous) if previous.content == *content => {
                debug!("Notification [{}] refreshed", key);
            }
            Some(_) => info!("Notification [{}] updated: {}", key, content.title),
            None => info!("Notification [{}] raised: {}", key, content.title),
        }

        Ok(NotificationHandle {
            key: key.clone(),
            serial,
        })
    }

    async fn clear(&self, key: &NotificationKey) -> Result<bool, Error> {
        let removed = self.records.write().await.remove(key).is_some();
        if removed {
            info!("Notification [{}] cleared", key);
        }
        Ok(removed)
    }

    async fn activate(&self, handle: &NotificationHandle) -> Result<Option<String>, Error> {
        let mut records = self.records.write().await;

        // Only the record the handle was issued for may be activated
        let is_current = records
            .get(&handle.key)
            .is_some_and(|record| record.serial == handle.serial);
        if !is_current {
            debug!("Stale notification handle {}", handle);
            return Ok(None);
        }

        let record = records.remove(&handle.key);
        info!("Notification [{}] activated", handle.key);
        Ok(record.and_then(|r| r.content.reference))
    }

    async fn live_count(&self) -> usize {
        self.records.read().await.len()
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}
