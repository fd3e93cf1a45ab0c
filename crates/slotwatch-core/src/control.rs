//! Control channel between a foreground surface and the engine
//!
//! Messages arrive as JSON `{ "message": ..., "payload": ... }` documents and
//! travel to the engine over a bounded tokio channel. Senders may attach a
//! oneshot reply slot to receive the engine's answer.
//!
//! ```text
//! {"message":"updateMonitor","payload":{"interval":3}}
//! {"message":"rescan"}
//! {"message":"setSelected","payload":{"locationId":"590","selected":true}}
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::engine::{PassSummary, QueryReport};
use crate::error::{Error, Result};
use crate::traits::{NotificationContent, NotificationHandle};

/// Queue depth of the control channel
pub const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// A request from the foreground surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "message",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ControlMessage {
    /// Change the polling interval; `interval <= 0` disables monitoring
    UpdateMonitor { interval: i64 },

    /// Raise a one-off alert under its own key
    SendNotification(NotificationContent),

    /// Run a background pass now
    Rescan,

    /// Query every watched location without touching notifications
    Query,

    /// Select or deselect a watched location
    SetSelected { location_id: String, selected: bool },

    /// The user acted on a notification
    Activate { handle: NotificationHandle },
}

impl ControlMessage {
    /// Parse one JSON control document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateMonitor { .. } => "updateMonitor",
            Self::SendNotification(_) => "sendNotification",
            Self::Rescan => "rescan",
            Self::Query => "query",
            Self::SetSelected { .. } => "setSelected",
            Self::Activate { .. } => "activate",
        }
    }
}

/// The engine's answer to a [`ControlMessage`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "reply",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ControlReply {
    /// Applied with nothing to report
    Ack,

    /// Background pass finished
    Pass(PassSummary),

    /// Foreground query results, in watch-list order
    Query(Vec<QueryReport>),

    /// Ad-hoc alert raised
    Notified(NotificationHandle),

    /// Navigable reference of the activated alert, if it was still live
    Activated { reference: Option<String> },

    /// Whether the location was on the watch-list
    Selected { found: bool },

    /// The request could not be applied
    Rejected { error: String },
}

/// One queued control request
#[derive(Debug)]
pub struct ControlEnvelope {
    pub message: ControlMessage,
    pub reply: Option<oneshot::Sender<ControlReply>>,
}

impl ControlEnvelope {
    /// Deliver the reply, if the sender is still waiting
    pub fn respond(self, reply: ControlReply) {
        if let Some(tx) = self.reply {
            // Requester may have given up
            let _ = tx.send(reply);
        }
    }
}

/// Sending half of the control channel
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<ControlEnvelope>,
}

/// Receiving half of the control channel, owned by the engine
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::Receiver<ControlEnvelope>,
}

/// Create a control channel
pub fn channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControlSender { tx }, ControlReceiver { rx })
}

impl ControlSender {
    /// Queue a message without waiting for the reply
    pub async fn send(&self, message: ControlMessage) -> Result<()> {
        self.tx
            .send(ControlEnvelope {
                message,
                reply: None,
            })
            .await
            .map_err(|_| Error::channel("Engine is not accepting control messages"))
    }

    /// Queue a message and wait for the engine's reply
    pub async fn request(&self, message: ControlMessage) -> Result<ControlReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlEnvelope {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| Error::channel("Engine is not accepting control messages"))?;

        reply_rx
            .await
            .map_err(|_| Error::channel("Engine dropped the request without replying"))
    }
}

impl ControlReceiver {
    /// Next queued request; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<ControlEnvelope> {
        self.rx.recv().await
    }
}
