//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on what the engine did,
//! not just on the final state.

#![allow(dead_code)]

use slotwatch_core::error::{Error, Result};
use slotwatch_core::traits::{
    AvailabilityClient, NotificationContent, NotificationHandle, NotificationKey,
    NotificationSink, Scheduler, Slot, Tick,
};
use slotwatch_core::{
    DisplayInfo, EngineConfig, EngineEvent, MemoryNotificationSink, MemoryStateStore,
    MonitorEngine, WatchEntry,
};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Scripted response for one `fetch_slots` call
#[derive(Clone)]
pub enum Scripted {
    Slots(Vec<Slot>),
    NetworkError,
    ParseError,
    /// Wait for the notify, then return the slots
    Held(Arc<Notify>, Vec<Slot>),
    /// Never complete
    Hang,
}

/// `count` distinct slots on consecutive days
pub fn slots(count: usize) -> Vec<Slot> {
    (1..=count)
        .map(|day| {
            Slot::new(
                format!("2020-04-{day:02}"),
                format!("2020-04-{day:02}T09:00:00-05:00"),
                format!("2020-04-{day:02}T09:30:00-05:00"),
            )
        })
        .collect()
}

/// An availability client replaying scripted responses per location
///
/// Once a location's script is exhausted its last response repeats; an
/// unscripted location returns no slots.
#[derive(Clone, Default)]
pub struct MockAvailabilityClient {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    last: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<String>>>,
    active: Arc<Mutex<HashMap<String, usize>>>,
    max_concurrent_same_location: Arc<AtomicUsize>,
}

impl MockAvailabilityClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for a location
    pub fn script(&self, location_id: &str, responses: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(location_id.to_string())
            .or_default()
            .extend(responses);
    }

    /// Location ids in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, location_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == location_id)
            .count()
    }

    /// Highest number of simultaneous queries ever seen for one location
    pub fn max_concurrent_same_location(&self) -> usize {
        self.max_concurrent_same_location.load(Ordering::SeqCst)
    }

    fn next_response(&self, location_id: &str) -> Scripted {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(location_id)
            .and_then(VecDeque::pop_front);

        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                last.insert(location_id.to_string(), response.clone());
                response
            }
            None => last
                .get(location_id)
                .cloned()
                .unwrap_or(Scripted::Slots(Vec::new())),
        }
    }

    fn enter(&self, location_id: &str) {
        let mut active = self.active.lock().unwrap();
        let count = active.entry(location_id.to_string()).or_default();
        *count += 1;
        self.max_concurrent_same_location
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, location_id: &str) {
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(location_id) {
            *count -= 1;
        }
    }
}

#[async_trait::async_trait]
impl AvailabilityClient for MockAvailabilityClient {
    async fn fetch_slots(&self, location_id: &str) -> Result<Vec<Slot>> {
        self.calls.lock().unwrap().push(location_id.to_string());
        self.enter(location_id);

        let result = match self.next_response(location_id) {
            Scripted::Slots(slots) => Ok(slots),
            Scripted::NetworkError => Err(Error::network("connection reset")),
            Scripted::ParseError => Err(Error::parse("missing items")),
            Scripted::Held(gate, slots) => {
                gate.notified().await;
                Ok(slots)
            }
            Scripted::Hang => std::future::pending().await,
        };

        self.leave(location_id);
        result
    }

    fn client_name(&self) -> &'static str {
        "mock"
    }
}

/// A sink call as observed by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Notify(NotificationKey, NotificationContent),
    Clear(NotificationKey),
    Activate(NotificationHandle),
}

/// A notification sink that records calls and keeps real state
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<MemoryNotificationSink>,
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn notify_calls(&self, key: &NotificationKey) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Notify(k, _) if k == key))
            .count()
    }

    pub fn clear_calls(&self, key: &NotificationKey) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Clear(k) if k == key))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub async fn is_live(&self, key: &NotificationKey) -> bool {
        self.inner.content(key).await.is_some()
    }

    pub async fn content(&self, key: &NotificationKey) -> Option<NotificationContent> {
        self.inner.content(key).await
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        key: &NotificationKey,
        content: &NotificationContent,
    ) -> Result<NotificationHandle> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Notify(key.clone(), content.clone()));
        self.inner.notify(key, content).await
    }

    async fn clear(&self, key: &NotificationKey) -> Result<bool> {
        self.calls.lock().unwrap().push(SinkCall::Clear(key.clone()));
        self.inner.clear(key).await
    }

    async fn activate(&self, handle: &NotificationHandle) -> Result<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Activate(handle.clone()));
        self.inner.activate(handle).await
    }

    async fn live_count(&self) -> usize {
        self.inner.live_count().await
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

/// A scheduler call as observed by [`ManualScheduler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Arm {
        name: String,
        initial_delay: Duration,
        period: Duration,
    },
    Disarm {
        name: String,
    },
}

/// A scheduler whose ticks are fired by the test
#[derive(Clone)]
pub struct ManualScheduler {
    armed: Arc<Mutex<HashMap<String, (u64, Duration)>>>,
    calls: Arc<Mutex<Vec<SchedulerCall>>>,
    generation: Arc<AtomicU64>,
    tick_tx: mpsc::UnboundedSender<Tick>,
    tick_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Tick>>>>,
    replaces: bool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::with_replace_semantics(true)
    }

    /// A scheduler that reports whether re-arming replaces a schedule
    pub fn with_replace_semantics(replaces: bool) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            armed: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            generation: Arc::new(AtomicU64::new(0)),
            tick_tx,
            tick_rx: Arc::new(Mutex::new(Some(tick_rx))),
            replaces,
        }
    }

    /// Fire a tick for `name` if it is armed; returns whether it fired
    pub fn fire(&self, name: &str) -> bool {
        let generation = match self.armed.lock().unwrap().get(name) {
            Some((generation, _)) => *generation,
            None => return false,
        };
        self.tick_tx.send(Tick::new(name, generation)).is_ok()
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn armed_names(&self) -> Vec<String> {
        self.armed.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Scheduler for ManualScheduler {
    async fn arm(&self, name: &str, initial_delay: Duration, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::config("zero period"));
        }
        self.calls.lock().unwrap().push(SchedulerCall::Arm {
            name: name.to_string(),
            initial_delay,
            period,
        });
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.armed
            .lock()
            .unwrap()
            .insert(name.to_string(), (generation, period));
        Ok(())
    }

    async fn disarm(&self, name: &str) {
        self.calls.lock().unwrap().push(SchedulerCall::Disarm {
            name: name.to_string(),
        });
        self.armed.lock().unwrap().remove(name);
    }

    fn is_armed(&self, name: &str) -> bool {
        self.armed.lock().unwrap().contains_key(name)
    }

    fn armed_period(&self, name: &str) -> Option<Duration> {
        self.armed.lock().unwrap().get(name).map(|(_, period)| *period)
    }

    fn ticks(&self) -> Pin<Box<dyn Stream<Item = Tick> + Send + 'static>> {
        let rx = self
            .tick_rx
            .lock()
            .unwrap()
            .take()
            .expect("ticks() can only be called once");
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn replaces_on_rearm(&self) -> bool {
        self.replaces
    }
}

/// Everything a contract test needs to drive and observe an engine
pub struct Harness {
    pub engine: Arc<MonitorEngine>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub client: MockAvailabilityClient,
    pub sink: RecordingSink,
    pub scheduler: ManualScheduler,
    pub store: MemoryStateStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(ManualScheduler::new(), MemoryStateStore::new())
    }

    pub fn with_parts(scheduler: ManualScheduler, store: MemoryStateStore) -> Self {
        let client = MockAvailabilityClient::new();
        let sink = RecordingSink::new();

        let (engine, events) = MonitorEngine::new(
            Arc::new(client.clone()),
            Arc::new(sink.clone()),
            Arc::new(scheduler.clone()),
            Arc::new(store.clone()),
            EngineConfig::default(),
        )
        .expect("default engine config is valid");

        Self {
            engine: Arc::new(engine),
            events,
            client,
            sink,
            scheduler,
            store,
        }
    }

    /// Persist a watch-list where every listed id is selected
    pub async fn watch(&self, location_ids: &[&str]) {
        let entries: Vec<_> = location_ids
            .iter()
            .map(|id| entry(id).with_selected(true))
            .collect();
        self.engine
            .config_store()
            .replace_watch_list(&entries)
            .await;
    }

    /// Run the engine on a background task
    pub fn start(&self) -> Running {
        let (shutdown, rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(rx)).await });
        Running { shutdown, handle }
    }

    /// Drain events currently queued
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// A running engine and its shutdown trigger
pub struct Running {
    pub shutdown: oneshot::Sender<()>,
    pub handle: JoinHandle<Result<()>>,
}

impl Running {
    /// Signal shutdown and wait for the engine to return
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.handle.await.expect("engine task panicked")
    }
}

/// Unselected watch entry with plausible display details
pub fn entry(location_id: &str) -> WatchEntry {
    WatchEntry::new(
        location_id,
        DisplayInfo {
            name: format!("Store {location_id}"),
            address1: "1 Main St".to_string(),
            city: "Austin".to_string(),
            state: "TX".to_string(),
            postal_code: "78701".to_string(),
        },
    )
}

/// Wait until `events` yields an event matching `predicate`
pub async fn wait_for_event(
    events: &mut mpsc::Receiver<EngineEvent>,
    predicate: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}
