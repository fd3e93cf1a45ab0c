//! Per-location serialization contract
//!
//! A location is never queried twice at once: a pass that finds a location
//! still outstanding from an earlier pass skips it.

mod common;

use common::{Harness, Scripted, slots};
use slotwatch_core::{EngineEvent, NotificationKey};
use std::sync::Arc;
use tokio::sync::Notify;

async fn wait_for_calls(harness: &Harness, location_id: &str, count: usize) {
    while harness.client.calls_for(location_id) < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn overlapping_pass_skips_outstanding_location() {
    let mut harness = Harness::new();
    harness.watch(&["slow", "fast"]).await;

    let gate = Arc::new(Notify::new());
    harness
        .client
        .script("slow", vec![Scripted::Held(gate.clone(), slots(1))]);

    let engine = Arc::clone(&harness.engine);
    let first = tokio::spawn(async move { engine.run_pass().await });
    wait_for_calls(&harness, "slow", 1).await;
    wait_for_calls(&harness, "fast", 1).await;
    tokio::task::yield_now().await;

    let second = harness.engine.run_pass().await;
    assert_eq!(second.skipped, 1);
    assert_eq!(second.checked, 1);
    assert_eq!(harness.client.calls_for("slow"), 1);
    assert_eq!(harness.client.calls_for("fast"), 2);

    gate.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.found, 1);

    assert!(
        harness
            .drain_events()
            .contains(&EngineEvent::QuerySkipped {
                location_id: "slow".to_string()
            })
    );
    assert_eq!(harness.client.max_concurrent_same_location(), 1);
}

#[tokio::test]
async fn location_is_queried_again_once_released() {
    let harness = Harness::new();
    harness.watch(&["slow"]).await;

    let gate = Arc::new(Notify::new());
    harness.client.script(
        "slow",
        vec![
            Scripted::Held(gate.clone(), slots(1)),
            Scripted::Slots(Vec::new()),
        ],
    );

    let engine = Arc::clone(&harness.engine);
    let first = tokio::spawn(async move { engine.run_pass().await });
    wait_for_calls(&harness, "slow", 1).await;
    gate.notify_one();
    first.await.unwrap();

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.empty, 1);
    assert_eq!(harness.client.calls_for("slow"), 2);
    assert!(
        !harness
            .sink
            .is_live(&NotificationKey::for_location("slow"))
            .await
    );
}

#[tokio::test]
async fn disabling_mid_pass_still_applies_in_flight_result() {
    let harness = Harness::new();
    harness.watch(&["slow"]).await;
    harness
        .engine
        .set_monitor_config(slotwatch_core::MonitorConfig::enabled(5))
        .await
        .unwrap();

    let gate = Arc::new(Notify::new());
    harness
        .client
        .script("slow", vec![Scripted::Held(gate.clone(), slots(2))]);

    let engine = Arc::clone(&harness.engine);
    let pass = tokio::spawn(async move { engine.run_pass().await });
    wait_for_calls(&harness, "slow", 1).await;

    harness
        .engine
        .set_monitor_config(slotwatch_core::MonitorConfig::disabled())
        .await
        .unwrap();
    gate.notify_one();
    pass.await.unwrap();

    assert!(
        harness
            .sink
            .is_live(&NotificationKey::for_location("slow"))
            .await
    );
    assert!(!harness.scheduler.fire("checkSlots"));
}
