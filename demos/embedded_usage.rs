//! Minimal embedding example for slotwatch-core
//!
//! Drives the engine from an application that supplies its own availability
//! client and talks to the engine only through the control channel. No
//! network access is needed.

use async_trait::async_trait;
use slotwatch_core::traits::{AvailabilityClient, NotificationSink, Slot};
use slotwatch_core::{
    ControlMessage, DisplayInfo, EngineConfig, MemoryNotificationSink, MemoryStateStore,
    MonitorEngine, Result, TokioScheduler, WatchEntry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Availability client answering from a fixed table
///
/// Every second call for a location reports no slots, so alerts are raised
/// and cleared as the demo rescans.
struct CannedClient {
    slots: HashMap<String, Vec<Slot>>,
    calls: AtomicUsize,
}

impl CannedClient {
    fn new() -> Self {
        let mut slots = HashMap::new();
        slots.insert(
            "590".to_string(),
            vec![
                Slot::new("2026-10-16", "2026-10-16T09:00:00", "2026-10-16T10:00:00"),
                Slot::new("2026-10-16", "2026-10-16T13:30:00", "2026-10-16T14:30:00"),
            ],
        );
        Self {
            slots,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AvailabilityClient for CannedClient {
    async fn fetch_slots(&self, location_id: &str) -> Result<Vec<Slot>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 4 >= 2 {
            return Ok(Vec::new());
        }
        Ok(self.slots.get(location_id).cloned().unwrap_or_default())
    }

    fn client_name(&self) -> &'static str {
        "canned"
    }
}

fn store(id: &str, name: &str, distance: f64) -> WatchEntry {
    WatchEntry::new(
        id,
        DisplayInfo {
            name: name.to_string(),
            address1: "1 Main St".to_string(),
            city: "Austin".to_string(),
            state: "TX".to_string(),
            postal_code: "78701".to_string(),
        },
    )
    .with_distance(distance)
    .with_selected(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded slotwatch-core Example ===\n");

    let sink = Arc::new(MemoryNotificationSink::new());

    println!("1. Creating engine...");
    let (engine, mut event_rx) = MonitorEngine::new(
        Arc::new(CannedClient::new()),
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        Arc::new(TokioScheduler::new()),
        Arc::new(MemoryStateStore::new()),
        EngineConfig::default(),
    )?;

    engine
        .config_store()
        .replace_watch_list(&[
            store("590", "Mueller H-E-B", 1.4),
            store("22", "Hancock H-E-B", 2.9),
        ])
        .await;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    let control = engine.control();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let engine = Arc::new(engine);
    let engine_handle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await })
    };

    println!("2. Rescanning twice (slots appear, then go away)...");
    for _ in 0..2 {
        let reply = control.request(ControlMessage::Rescan).await?;
        println!("   {}", serde_json::to_string(&reply)?);
        println!("   live alerts: {}", sink.live_count().await);
    }

    println!("3. Foreground query (never touches alerts)...");
    let reply = control.request(ControlMessage::Query).await?;
    println!("   {}", serde_json::to_string_pretty(&reply)?);

    println!("4. Enabling the monitor every 5 minutes...");
    let reply = control
        .request(ControlMessage::UpdateMonitor { interval: 5 })
        .await?;
    println!("   {}", serde_json::to_string(&reply)?);

    println!("5. Stopping engine...");
    let _ = shutdown_tx.send(());
    if let Ok(result) = engine_handle.await {
        result?;
    }

    drop(engine);
    let _ = event_listener.await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
