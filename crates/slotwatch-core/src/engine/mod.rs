//! Core monitoring engine
//!
//! The MonitorEngine is responsible for:
//! - Arming and disarming the scheduler from the persisted monitor config
//! - Running a background pass on every tick
//! - Driving the notification sink from each location's query outcome
//! - Serving control messages from the foreground surface
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐        ┌──────────────────┐
//! │  Scheduler  │─ Tick ─▶                  │◀─ ControlMessage ─ ControlSender
//! └─────────────┘        │  MonitorEngine   │
//!                        └──────────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//! ┌──────────────┐      ┌────────────────────┐   ┌──────────────────┐
//! │ ConfigStore  │      │ AvailabilityClient │   │ NotificationSink │
//! │ (watch-list) │      │ (per location)     │   │ (notify / clear) │
//! └──────────────┘      └────────────────────┘   └──────────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Tick received for the engine's schedule
//! 2. Read the selected entries from the ConfigStore
//! 3. Query every entry concurrently, skipping any still outstanding
//! 4. Slots found: notify under the location's key
//! 5. No slots: clear the location's key
//! 6. Query failed: leave the location's notification untouched

mod report;

pub use report::{PassSummary, QueryOutcome, QueryReport};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, MonitorConfig};
use crate::config_store::{ConfigStore, keys};
use crate::control::{self, ControlEnvelope, ControlMessage, ControlReceiver, ControlReply, ControlSender};
use crate::error::{Error, Result};
use crate::render;
use crate::traits::{
    AvailabilityClient, NotificationContent, NotificationHandle, NotificationKey,
    NotificationSink, Scheduler, Slot, SlotQueryResult, StateStore, StoreLocator, StoreQuery,
};
use crate::watch::{WatchEntry, WatchList};

/// Events emitted by the MonitorEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { selected_count: usize },

    /// Background pass started
    PassStarted { locations: usize },

    /// Slots found and the location's alert raised or refreshed
    SlotsFound {
        location_id: String,
        slot_count: usize,
    },

    /// Slots gone and a live alert removed
    SlotsCleared { location_id: String },

    /// Query failed; the location's alert was left as it was
    QueryFailed { location_id: String, error: String },

    /// Query skipped because the previous one is still outstanding
    QuerySkipped { location_id: String },

    /// Background pass finished
    PassCompleted(PassSummary),

    /// Schedule armed
    MonitorArmed { interval_minutes: u32 },

    /// Schedule disarmed
    MonitorDisarmed,

    /// Ad-hoc alert raised
    NotificationSent { key: NotificationKey },

    /// Watch-list replaced by a store search
    WatchListReplaced { count: usize },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core monitoring engine
///
/// ## Lifecycle
///
/// 1. Create with [`MonitorEngine::new()`]
/// 2. Grab a [`ControlSender`] with [`MonitorEngine::control()`] if a
///    foreground surface needs one
/// 3. Start with [`MonitorEngine::run()`]; persisted monitoring is re-armed
/// 4. Engine runs until shutdown, then waits for in-flight passes and
///    flushes the store
///
/// ## Concurrency
///
/// Every location in a pass is queried on its own task. A location whose
/// query from an earlier tick is still outstanding is skipped, so at most one
/// query per location is ever in flight. Passes themselves may overlap.
pub struct MonitorEngine {
    inner: Arc<EngineInner>,
    control_tx: ControlSender,
    control_rx: Mutex<Option<ControlReceiver>>,
}

struct EngineInner {
    client: Arc<dyn AvailabilityClient>,
    sink: Arc<dyn NotificationSink>,
    scheduler: Arc<dyn Scheduler>,
    config_store: ConfigStore,
    config: EngineConfig,
    in_flight: Mutex<HashSet<String>>,
    adhoc_sequence: AtomicU64,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl MonitorEngine {
    /// Create a new monitoring engine
    ///
    /// # Parameters
    ///
    /// - `client`: Availability client queried for each location
    /// - `sink`: Notification sink driven by query outcomes
    /// - `scheduler`: Scheduler producing the engine's ticks
    /// - `state_store`: Raw store behind the engine's ConfigStore
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        client: Arc<dyn AvailabilityClient>,
        sink: Arc<dyn NotificationSink>,
        scheduler: Arc<dyn Scheduler>,
        state_store: Arc<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (control_tx, control_rx) = control::channel(control::CONTROL_CHANNEL_CAPACITY);

        let inner = EngineInner {
            client,
            sink,
            scheduler,
            config_store: ConfigStore::new(state_store),
            config,
            in_flight: Mutex::new(HashSet::new()),
            adhoc_sequence: AtomicU64::new(0),
            event_tx,
        };

        let engine = Self {
            inner: Arc::new(inner),
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
        };

        Ok((engine, event_rx))
    }

    /// Sender for control messages handled by the running engine
    pub fn control(&self) -> ControlSender {
        self.control_tx.clone()
    }

    /// Typed view over the engine's persisted state
    pub fn config_store(&self) -> &ConfigStore {
        &self.inner.config_store
    }

    /// Run the engine until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The engine was already running, or the final flush failed
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// Passing `None` waits for SIGINT, like [`MonitorEngine::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut control_rx = self
            .control_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Other("Engine is already running".to_string()))?;

        let mut ticks = self.inner.scheduler.ticks();

        if let Err(e) = self.restore().await {
            error!("Failed to restore monitor schedule: {}", e);
        }

        let selected_count = self.inner.config_store.selected_watch_list().await.len();
        info!(
            "Engine started with {} selected location(s), client: {}, sink: {}",
            selected_count,
            self.inner.client.client_name(),
            self.inner.sink.sink_name()
        );
        self.inner.emit_event(EngineEvent::Started { selected_count });

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for SIGINT: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut passes: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                Some(tick) = ticks.next() => {
                    if tick.name != self.inner.config.schedule_name {
                        debug!("Ignoring tick for foreign schedule {}", tick.name);
                        continue;
                    }
                    debug!("Tick {} (generation {})", tick.name, tick.generation);
                    let inner = Arc::clone(&self.inner);
                    passes.spawn(async move {
                        inner.run_pass().await;
                    });
                }

                Some(envelope) = control_rx.recv() => {
                    self.dispatch_control(envelope, &mut passes).await;
                }

                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    if let Err(e) = joined {
                        error!("Background task failed: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // No new ticks; in-flight passes still apply their results
        self.inner
            .scheduler
            .disarm(&self.inner.config.schedule_name)
            .await;

        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                error!("Background task failed during shutdown: {}", e);
            }
        }

        self.inner.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        self.inner.config_store.flush().await?;
        info!("State flushed, engine stopped");

        Ok(())
    }

    /// Handle a queued control request
    ///
    /// Passes and queries run on the background set so the loop keeps
    /// serving ticks; every other message is applied in arrival order.
    async fn dispatch_control(&self, envelope: ControlEnvelope, passes: &mut JoinSet<()>) {
        debug!("Control message: {}", envelope.message.name());

        if matches!(envelope.message, ControlMessage::Rescan | ControlMessage::Query) {
            let inner = Arc::clone(&self.inner);
            passes.spawn(async move {
                let reply = inner.handle_control(envelope.message.clone()).await;
                envelope.respond(reply);
            });
            return;
        }

        let reply = Arc::clone(&self.inner)
            .handle_control(envelope.message.clone())
            .await;
        envelope.respond(reply);
    }

    /// Apply a control message directly and return the reply
    pub async fn handle_control(&self, message: ControlMessage) -> ControlReply {
        Arc::clone(&self.inner).handle_control(message).await
    }

    /// Apply, persist and schedule a monitor config
    ///
    /// An enabled config with a zero interval is rejected with
    /// [`Error::Config`] and applied as "disabled".
    pub async fn set_monitor_config(&self, config: MonitorConfig) -> Result<()> {
        self.inner.set_monitor_config(config).await
    }

    /// Re-arm (or disarm) the schedule from the persisted monitor config
    pub async fn restore(&self) -> Result<()> {
        let config = self.inner.config_store.monitor_config().await;
        debug!("Restoring monitor config: {:?}", config);
        self.inner.apply_schedule(&config).await
    }

    /// Run one background pass now
    pub async fn run_pass(&self) -> PassSummary {
        Arc::clone(&self.inner).run_pass().await
    }

    /// Query every watched location for display, without touching notifications
    pub async fn query(&self) -> Vec<QueryReport> {
        Arc::clone(&self.inner).query().await
    }

    /// Raise a one-off alert under a fresh key
    pub async fn send_notification(&self, content: NotificationContent) -> Result<NotificationHandle> {
        self.inner.send_notification(content).await
    }

    /// Act on an alert; returns its reference and clears it
    pub async fn activate(&self, handle: &NotificationHandle) -> Result<Option<String>> {
        self.inner.sink.activate(handle).await
    }

    /// Search for stores near `address` and replace the watch-list
    ///
    /// The radius and result limit come from the persisted preferences. The
    /// searched address is persisted as the new default.
    pub async fn search_stores(
        &self,
        locator: &dyn StoreLocator,
        address: &str,
    ) -> Result<WatchList> {
        let preferences = self.inner.config_store.preferences().await;
        let query = StoreQuery {
            address: address.to_string(),
            radius: preferences.radius,
        };

        let mut entries = locator.find_stores(&query).await?;
        entries.truncate(preferences.max_store);

        self.inner.config_store.replace_watch_list(&entries).await;
        self.inner.config_store.set(keys::ADDRESS, address).await;

        info!(
            "Watch-list replaced with {} store(s) within {} miles of {}",
            entries.len(),
            query.radius,
            address
        );
        self.inner.emit_event(EngineEvent::WatchListReplaced {
            count: entries.len(),
        });

        Ok(entries)
    }
}

impl EngineInner {
    async fn handle_control(self: Arc<Self>, message: ControlMessage) -> ControlReply {
        match message {
            ControlMessage::UpdateMonitor { interval } => {
                match self
                    .set_monitor_config(MonitorConfig::from_interval(interval))
                    .await
                {
                    Ok(()) => ControlReply::Ack,
                    Err(e) => ControlReply::Rejected {
                        error: e.to_string(),
                    },
                }
            }
            ControlMessage::SendNotification(content) => {
                match self.send_notification(content).await {
                    Ok(handle) => ControlReply::Notified(handle),
                    Err(e) => ControlReply::Rejected {
                        error: e.to_string(),
                    },
                }
            }
            ControlMessage::Rescan => ControlReply::Pass(self.run_pass().await),
            ControlMessage::Query => ControlReply::Query(self.query().await),
            ControlMessage::SetSelected {
                location_id,
                selected,
            } => {
                let found = self
                    .config_store
                    .set_selected(&location_id, selected)
                    .await;
                if !found {
                    warn!("Cannot select unknown location {}", location_id);
                }
                ControlReply::Selected { found }
            }
            ControlMessage::Activate { handle } => match self.sink.activate(&handle).await {
                Ok(reference) => ControlReply::Activated { reference },
                Err(e) => ControlReply::Rejected {
                    error: e.to_string(),
                },
            },
        }
    }

    async fn set_monitor_config(&self, config: MonitorConfig) -> Result<()> {
        let (applied, rejection) = match config.validate() {
            Ok(()) => (config, None),
            Err(e) => {
                warn!("Rejected monitor config {:?}: {}, disabling", config, e);
                (MonitorConfig::disabled(), Some(e))
            }
        };

        self.config_store.set_monitor_config(&applied).await;

        if let Err(e) = self.apply_schedule(&applied).await {
            // Keep the persisted switch in line with the scheduler
            self.config_store
                .set_monitor_config(&MonitorConfig::disabled())
                .await;
            return Err(e);
        }

        match rejection {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn apply_schedule(&self, config: &MonitorConfig) -> Result<()> {
        let name = &self.config.schedule_name;

        if !config.enabled {
            self.scheduler.disarm(name).await;
            info!("Monitoring disabled");
            self.emit_event(EngineEvent::MonitorDisarmed);
            return Ok(());
        }

        config.validate()?;

        if !self.scheduler.replaces_on_rearm() {
            self.scheduler.disarm(name).await;
        }
        self.scheduler
            .arm(name, Duration::ZERO, config.period())
            .await?;

        info!(
            "Monitoring enabled, checking every {} minute(s)",
            config.interval_minutes
        );
        self.emit_event(EngineEvent::MonitorArmed {
            interval_minutes: config.interval_minutes,
        });
        Ok(())
    }

    async fn run_pass(self: Arc<Self>) -> PassSummary {
        let entries = self.config_store.selected_watch_list().await;
        let max_slot = self.config_store.preferences().await.max_slot;

        debug!("Pass started for {} location(s)", entries.len());
        self.emit_event(EngineEvent::PassStarted {
            locations: entries.len(),
        });

        let mut summary = PassSummary::default();
        let mut checks = JoinSet::new();

        for entry in entries {
            let Some(guard) = InFlightGuard::acquire(&self, &entry.location_id) else {
                debug!(
                    "Query for {} still outstanding, skipping this tick",
                    entry.location_id
                );
                summary.skipped += 1;
                self.emit_event(EngineEvent::QuerySkipped {
                    location_id: entry.location_id,
                });
                continue;
            };

            let inner = Arc::clone(&self);
            checks.spawn(async move {
                let _guard = guard;
                inner.check_location(&entry, max_slot).await
            });
        }

        while let Some(joined) = checks.join_next().await {
            summary.checked += 1;
            match joined {
                Ok(LocationState::Found) => summary.found += 1,
                Ok(LocationState::Empty) => summary.empty += 1,
                Ok(LocationState::Failed) => summary.failed += 1,
                Err(e) => {
                    error!("Location check task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Pass complete: {} checked, {} with slots, {} empty, {} failed, {} skipped",
            summary.checked, summary.found, summary.empty, summary.failed, summary.skipped
        );
        self.emit_event(EngineEvent::PassCompleted(summary));
        summary
    }

    /// Query one location and drive its notification
    async fn check_location(&self, entry: &WatchEntry, max_slot: usize) -> LocationState {
        let location_id = &entry.location_id;
        let key = NotificationKey::for_location(location_id);

        let result = match self.fetch(location_id).await {
            Ok(slots) => SlotQueryResult::new(location_id.clone(), slots),
            Err(e) => {
                warn!("Query for {} failed: {}", location_id, e);
                self.emit_event(EngineEvent::QueryFailed {
                    location_id: location_id.clone(),
                    error: e.to_string(),
                });
                return LocationState::Failed;
            }
        };

        if result.has_slots() {
            let content = render::slot_notification(&self.config, entry, &result.slots, max_slot);
            match self.sink.notify(&key, &content).await {
                Ok(handle) => {
                    debug!("Raised {} for {} slot(s)", handle, result.slots.len());
                    self.emit_event(EngineEvent::SlotsFound {
                        location_id: location_id.clone(),
                        slot_count: result.slots.len(),
                    });
                }
                Err(e) => warn!("Failed to notify for {}: {}", location_id, e),
            }
            return LocationState::Found;
        }

        match self.sink.clear(&key).await {
            Ok(true) => {
                info!("Slots gone at {}, alert cleared", location_id);
                self.emit_event(EngineEvent::SlotsCleared {
                    location_id: location_id.clone(),
                });
            }
            Ok(false) => debug!("No slots at {}", location_id),
            Err(e) => warn!("Failed to clear alert for {}: {}", location_id, e),
        }
        LocationState::Empty
    }

    async fn fetch(&self, location_id: &str) -> Result<Vec<Slot>> {
        let timeout = self.config.query_timeout();
        match tokio::time::timeout(timeout, self.client.fetch_slots(location_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::network(format!(
                "Query for {} timed out after {:?}",
                location_id, timeout
            ))),
        }
    }

    async fn query(self: Arc<Self>) -> Vec<QueryReport> {
        let preferences = self.config_store.preferences().await;
        let entries = self.config_store.watch_list().await;
        let max_slot = preferences.max_slot;

        let mut queries = JoinSet::new();
        for (rank, entry) in entries.into_iter().take(preferences.max_store).enumerate() {
            let inner = Arc::clone(&self);
            queries.spawn(async move {
                let outcome = match inner.fetch(&entry.location_id).await {
                    Ok(slots) if slots.is_empty() => QueryOutcome::Unavailable,
                    Ok(slots) => QueryOutcome::Available { slots },
                    Err(e) => QueryOutcome::Failed {
                        error: e.to_string(),
                    },
                };
                (rank, QueryReport::new(&entry, outcome, max_slot))
            });
        }

        let mut reports = Vec::with_capacity(queries.len());
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("Query task failed: {}", e),
            }
        }

        reports.sort_by_key(|(rank, _)| *rank);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    async fn send_notification(&self, mut content: NotificationContent) -> Result<NotificationHandle> {
        if content.title.is_empty() {
            content.title = self.config.notification_title.clone();
        }
        if content.icon_url.is_none() {
            content.icon_url = self.config.icon_url.clone();
        }

        let sequence = self.adhoc_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let key = NotificationKey::adhoc(sequence);
        let handle = self.sink.notify(&key, &content).await?;

        info!("Ad-hoc notification raised: {}", handle);
        self.emit_event(EngineEvent::NotificationSent { key });
        Ok(handle)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Where a location ended up after one background check
enum LocationState {
    Found,
    Empty,
    Failed,
}

/// Marks a location as queried until dropped
struct InFlightGuard {
    inner: Arc<EngineInner>,
    location_id: String,
}

impl InFlightGuard {
    fn acquire(inner: &Arc<EngineInner>, location_id: &str) -> Option<Self> {
        if !inner.in_flight().insert(location_id.to_string()) {
            return None;
        }
        Some(Self {
            inner: Arc::clone(inner),
            location_id: location_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.location_id);
    }
}
