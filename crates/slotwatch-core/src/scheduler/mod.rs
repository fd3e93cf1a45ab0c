//! Tokio-backed scheduler
//!
//! Each armed name owns one timer task that pushes [`Tick`]s into a shared
//! channel. Re-arming replaces the task atomically under the schedule lock,
//! and every tick carries the generation of the arm call that produced it;
//! the tick stream drops ticks whose generation is no longer current, so a
//! tick emitted just before a re-arm or disarm is never delivered.

use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::{Scheduler, Tick};

/// Scheduler running one timer task per armed name
///
/// Replaces on re-arm. Dropping the scheduler aborts every timer task.
pub struct TokioScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    schedules: Mutex<HashMap<String, ArmedSchedule>>,
    next_generation: AtomicU64,
    tick_tx: mpsc::UnboundedSender<Tick>,
    tick_rx: Mutex<Option<mpsc::UnboundedReceiver<Tick>>>,
}

struct ArmedSchedule {
    generation: u64,
    period: Duration,
    task: JoinHandle<()>,
}

impl Shared {
    fn schedules(&self) -> MutexGuard<'_, HashMap<String, ArmedSchedule>> {
        self.schedules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, tick: &Tick) -> bool {
        self.schedules()
            .get(&tick.name)
            .is_some_and(|s| s.generation == tick.generation)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for (_, schedule) in self.schedules().drain() {
            schedule.task.abort();
        }
    }
}

impl TokioScheduler {
    /// Create a scheduler with nothing armed
    pub fn new() -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                schedules: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                tick_tx,
                tick_rx: Mutex::new(Some(tick_rx)),
            }),
        }
    }

    /// Number of armed schedules
    pub fn armed_count(&self) -> usize {
        self.shared.schedules().len()
    }

    fn spawn_timer(
        &self,
        name: String,
        generation: u64,
        initial_delay: Duration,
        period: Duration,
    ) -> JoinHandle<()> {
        let tick_tx = self.shared.tick_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + initial_delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if tick_tx.send(Tick::new(name.clone(), generation)).is_err() {
                    debug!("Tick receiver dropped, stopping timer {}", name);
                    break;
                }
            }
        })
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn arm(&self, name: &str, initial_delay: Duration, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::config(format!(
                "Schedule {} needs a non-zero period",
                name
            )));
        }

        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);
        let task = self.spawn_timer(name.to_string(), generation, initial_delay, period);

        let previous = self.shared.schedules().insert(
            name.to_string(),
            ArmedSchedule {
                generation,
                period,
                task,
            },
        );

        if let Some(previous) = previous {
            previous.task.abort();
            debug!(
                "Replaced schedule {} (generation {} -> {})",
                name, previous.generation, generation
            );
        }

        info!(
            "Armed schedule {} (initial delay {:?}, period {:?})",
            name, initial_delay, period
        );
        Ok(())
    }

    async fn disarm(&self, name: &str) {
        let removed = self.shared.schedules().remove(name);
        if let Some(schedule) = removed {
            schedule.task.abort();
            info!("Disarmed schedule {}", name);
        }
    }

    fn is_armed(&self, name: &str) -> bool {
        self.shared.schedules().contains_key(name)
    }

    fn armed_period(&self, name: &str) -> Option<Duration> {
        self.shared.schedules().get(name).map(|s| s.period)
    }

    fn ticks(&self) -> Pin<Box<dyn Stream<Item = Tick> + Send + 'static>> {
        let taken = self
            .shared
            .tick_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(rx) = taken else {
            return Box::pin(tokio_stream::empty());
        };

        let shared = Arc::clone(&self.shared);
        Box::pin(UnboundedReceiverStream::new(rx).filter(move |tick| shared.is_current(tick)))
    }
}
