//! Notification state contract
//!
//! After every background pass, a location has a live alert exactly when its
//! last successful query returned slots. Failed queries leave the alert as it
//! was.

mod common;

use common::{Harness, Scripted, SinkCall, slots};
use slotwatch_core::{ControlMessage, ControlReply, NotificationContent, NotificationKey};

fn key(id: &str) -> NotificationKey {
    NotificationKey::for_location(id)
}

#[tokio::test]
async fn slots_found_notifies_once() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script("123", vec![Scripted::Slots(slots(3))]);

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.found, 1);
    assert_eq!(harness.sink.notify_calls(&key("123")), 1);
    assert_eq!(harness.sink.clear_calls(&key("123")), 0);
    assert!(harness.sink.is_live(&key("123")).await);
}

#[tokio::test]
async fn slots_gone_clears_without_notify() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script(
        "123",
        vec![Scripted::Slots(slots(3)), Scripted::Slots(Vec::new())],
    );

    harness.engine.run_pass().await;
    harness.sink.reset_calls();

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.empty, 1);
    assert_eq!(harness.sink.calls(), vec![SinkCall::Clear(key("123"))]);
    assert!(!harness.sink.is_live(&key("123")).await);
}

#[tokio::test]
async fn query_failure_makes_no_sink_call() {
    let harness = Harness::new();
    harness.watch(&["123", "456"]).await;
    harness.client.script("123", vec![Scripted::NetworkError]);
    harness.client.script("456", vec![Scripted::ParseError]);

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.failed, 2);
    assert!(harness.sink.calls().is_empty());
}

#[tokio::test]
async fn query_failure_keeps_previous_alert() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script(
        "123",
        vec![Scripted::Slots(slots(2)), Scripted::NetworkError],
    );

    harness.engine.run_pass().await;
    harness.engine.run_pass().await;

    assert!(harness.sink.is_live(&key("123")).await);
    assert_eq!(harness.sink.notify_calls(&key("123")), 1);
    assert_eq!(harness.sink.clear_calls(&key("123")), 0);
}

#[tokio::test]
async fn one_failing_location_does_not_abort_the_pass() {
    let harness = Harness::new();
    harness.watch(&["1", "2", "3"]).await;
    harness.client.script("1", vec![Scripted::Slots(slots(1))]);
    harness.client.script("2", vec![Scripted::NetworkError]);
    harness.client.script("3", vec![Scripted::Slots(slots(4))]);

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.checked, 3);
    assert_eq!(summary.found, 2);
    assert_eq!(summary.failed, 1);
    assert!(harness.sink.is_live(&key("1")).await);
    assert!(!harness.sink.is_live(&key("2")).await);
    assert!(harness.sink.is_live(&key("3")).await);
}

#[tokio::test]
async fn missing_watch_list_performs_no_work() {
    let harness = Harness::new();

    assert!(harness.engine.config_store().watch_list().await.is_empty());

    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.checked, 0);
    assert_eq!(harness.client.call_count(), 0);
    assert!(harness.sink.calls().is_empty());
}

#[tokio::test]
async fn alert_tracks_latest_successful_result() {
    let harness = Harness::new();
    harness.watch(&["7"]).await;
    let script = vec![
        Scripted::Slots(slots(1)),
        Scripted::Slots(slots(2)),
        Scripted::NetworkError,
        Scripted::Slots(Vec::new()),
        Scripted::ParseError,
        Scripted::Slots(Vec::new()),
        Scripted::Slots(slots(5)),
    ];
    harness.client.script("7", script.clone());

    let mut expected_live = false;
    for response in script {
        harness.engine.run_pass().await;
        if let Scripted::Slots(found) = response {
            expected_live = !found.is_empty();
        }
        assert_eq!(harness.sink.is_live(&key("7")).await, expected_live);
    }
}

#[tokio::test]
async fn repeated_finds_keep_one_record_with_latest_content() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script(
        "123",
        vec![Scripted::Slots(slots(1)), Scripted::Slots(slots(3))],
    );

    harness.engine.run_pass().await;
    harness.engine.run_pass().await;

    let live = harness.sink.content(&key("123")).await.unwrap();
    assert_eq!(live.message.lines().count(), 3 + 3);
    assert_eq!(
        live.reference.as_deref(),
        Some("https://www.heb.com/heb-store/123")
    );
    assert_eq!(
        slotwatch_core::NotificationSink::live_count(&harness.sink).await,
        1
    );
}

#[tokio::test]
async fn rendered_slots_respect_max_slot() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness
        .engine
        .config_store()
        .set(slotwatch_core::config_store::keys::MAX_SLOT, &2)
        .await;
    harness.client.script("123", vec![Scripted::Slots(slots(6))]);

    harness.engine.run_pass().await;

    let live = harness.sink.content(&key("123")).await.unwrap();
    // Three store lines plus two slot lines
    assert_eq!(live.message.lines().count(), 5);
}

#[tokio::test]
async fn activation_returns_reference_and_clears() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script("123", vec![Scripted::Slots(slots(1))]);
    harness.engine.run_pass().await;

    // First record raised by the sink carries serial 1
    let reply = harness
        .engine
        .handle_control(ControlMessage::Activate {
            handle: slotwatch_core::NotificationHandle {
                key: key("123"),
                serial: 1,
            },
        })
        .await;

    assert_eq!(
        reply,
        ControlReply::Activated {
            reference: Some("https://www.heb.com/heb-store/123".to_string())
        }
    );
    assert!(!harness.sink.is_live(&key("123")).await);
}

#[tokio::test]
async fn adhoc_notification_uses_its_own_key() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script("123", vec![Scripted::Slots(slots(1))]);
    harness.engine.run_pass().await;

    let handle = harness
        .engine
        .send_notification(NotificationContent::new("", "https://www.heb.com/heb-store/123"))
        .await
        .unwrap();

    assert_eq!(handle.key, NotificationKey::adhoc(1));
    let adhoc = harness.sink.content(&handle.key).await.unwrap();
    assert_eq!(adhoc.title, "Curbside slot found!");
    assert!(harness.sink.is_live(&key("123")).await);
    assert_eq!(slotwatch_core::NotificationSink::live_count(&harness.sink).await, 2);
}

#[tokio::test]
async fn foreground_query_is_read_only() {
    let harness = Harness::new();
    harness.watch(&["1", "2"]).await;
    harness.client.script("1", vec![Scripted::Slots(slots(2))]);
    harness.client.script("2", vec![Scripted::NetworkError]);

    let reports = harness.engine.query().await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].location_id, "1");
    assert!(reports[0].has_slots());
    assert!(matches!(
        reports[1].outcome,
        slotwatch_core::QueryOutcome::Failed { .. }
    ));
    assert!(harness.sink.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_query_times_out_as_failure() {
    let harness = Harness::new();
    harness.watch(&["123"]).await;
    harness.client.script(
        "123",
        vec![Scripted::Slots(slots(1)), Scripted::Hang],
    );

    harness.engine.run_pass().await;
    let summary = harness.engine.run_pass().await;

    assert_eq!(summary.failed, 1);
    assert!(harness.sink.is_live(&key("123")).await);
}
