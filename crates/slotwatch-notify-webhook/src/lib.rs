// # Webhook Notification Sink
//
// Delivers alerts as chat webhook messages (`{"content": "..."}`, the shape
// Discord and compatible services accept).
//
// ## Record Semantics
//
// A chat channel cannot retract a message, so the sink keeps the live record
// set itself:
//
// - `notify` posts when a key is new or its content changed, and stays quiet
//   when the same content is raised again
// - `clear` drops the record and, when configured, posts a short
//   "no longer available" follow-up
// - `activate` behaves like the in-memory sink: it returns the reference and
//   drops the record
//
// ## Security
//
// Webhook URLs embed a secret token; the URL never appears in logs or Debug
// output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slotwatch_core::traits::{
    NotificationContent, NotificationHandle, NotificationKey, NotificationSink,
};
use slotwatch_core::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Webhook sink configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Webhook endpoint
    /// ⚠️ NEVER log this value
    pub url: String,

    /// User to mention in every message
    #[serde(default)]
    pub mention_id: Option<u64>,

    /// Post a follow-up when a live alert is cleared
    #[serde(default)]
    pub post_resolved: bool,

    /// HTTP timeout per post, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl WebhookConfig {
    /// Config posting to `url` with defaults for everything else
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mention_id: None,
            post_resolved: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::config("Webhook URL must be http(s)"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("Webhook timeout must be > 0"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &"<REDACTED>")
            .field("mention_id", &self.mention_id)
            .field("post_resolved", &self.post_resolved)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Serialize)]
struct WebhookMessage {
    content: String,
}

#[derive(Debug, Clone)]
struct LiveRecord {
    serial: u64,
    content: NotificationContent,
}

/// Notification sink posting to a chat webhook
pub struct WebhookNotificationSink {
    config: WebhookConfig,
    client: reqwest::Client,
    records: Mutex<HashMap<NotificationKey, LiveRecord>>,
    next_serial: AtomicU64,
}

impl std::fmt::Debug for WebhookNotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotificationSink")
            .field("config", &self.config)
            .finish()
    }
}

impl WebhookNotificationSink {
    /// Create a sink from validated configuration
    pub fn new(config: WebhookConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            records: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(0),
        })
    }

    fn mention(&self) -> String {
        self.config
            .mention_id
            .map_or(String::new(), |id| format!("<@{id}> "))
    }

    /// Message text for a new or changed alert
    fn alert_text(&self, content: &NotificationContent) -> String {
        let mut text = format!("{}**{}**\n{}", self.mention(), content.title, content.message);
        if let Some(reference) = &content.reference {
            text.push('\n');
            text.push_str(reference);
        }
        text
    }

    /// Message text for a cleared alert
    fn resolved_text(&self, content: &NotificationContent) -> String {
        let headline = content.message.lines().next().unwrap_or_default();
        format!("No longer available: {}", headline)
    }

    async fn post(&self, text: String) -> Result<()> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&WebhookMessage { content: text })
            .send()
            .await
            .map_err(|e| Error::notification(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notification(format!(
                "Webhook rejected message: HTTP {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(
        &self,
        key: &NotificationKey,
        content: &NotificationContent,
    ) -> Result<NotificationHandle> {
        let unchanged = self
            .records
            .lock()
            .await
            .get(key)
            .filter(|record| record.content == *content)
            .map(|record| record.serial);

        if let Some(serial) = unchanged {
            debug!("Notification [{}] unchanged, not reposting", key);
            return Ok(NotificationHandle {
                key: key.clone(),
                serial,
            });
        }

        // Only record what was actually delivered
        self.post(self.alert_text(content)).await?;

        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.lock().await.insert(
            key.clone(),
            LiveRecord {
                serial,
                content: content.clone(),
            },
        );

        info!("Notification [{}] posted to webhook", key);
        Ok(NotificationHandle {
            key: key.clone(),
            serial,
        })
    }

    async fn clear(&self, key: &NotificationKey) -> Result<bool> {
        let Some(record) = self.records.lock().await.remove(key) else {
            return Ok(false);
        };

        info!("Notification [{}] cleared", key);
        if self.config.post_resolved {
            if let Err(e) = self.post(self.resolved_text(&record.content)).await {
                warn!("Failed to post resolution for [{}]: {}", key, e);
            }
        }
        Ok(true)
    }

    async fn activate(&self, handle: &NotificationHandle) -> Result<Option<String>> {
        let mut records = self.records.lock().await;

        let is_current = records
            .get(&handle.key)
            .is_some_and(|record| record.serial == handle.serial);
        if !is_current {
            debug!("Stale notification handle {}", handle);
            return Ok(None);
        }

        Ok(records
            .remove(&handle.key)
            .and_then(|record| record.content.reference))
    }

    async fn live_count(&self) -> usize {
        self.records.lock().await.len()
    }

    fn sink_name(&self) -> &'static str {
        "webhook"
    }
}
