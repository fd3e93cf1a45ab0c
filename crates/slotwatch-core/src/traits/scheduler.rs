// # Scheduler Trait
//
// Defines the interface for named periodic triggers.
//
// ## Semantics
//
// - `arm(name, initial_delay, period)`: first tick after `initial_delay`
//   (zero fires immediately), then every `period`
// - `disarm(name)`: stop ticking; no-op when `name` is not armed
// - Ticks are observed through the stream returned by `ticks()`
//
// ## Re-arming
//
// Schedulers that report `replaces_on_rearm() == true` guarantee that arming
// an already-armed name atomically replaces the old schedule: no duplicate
// ticking, and no tick from the replaced schedule is delivered afterwards.
// When a scheduler cannot guarantee this, the engine disarms before arming.

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

/// One firing of a named schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Schedule name
    pub name: String,
    /// Arm generation that produced this tick
    pub generation: u64,
}

impl Tick {
    /// Create a tick
    pub fn new(name: impl Into<String>, generation: u64) -> Self {
        Self {
            name: name.into(),
            generation,
        }
    }
}

/// Trait for periodic trigger implementations
///
/// # Responsibilities
///
/// A scheduler decides *when*, never *what*. It must not:
/// - Query availability or touch notifications (owned by `MonitorEngine`)
/// - Persist the cadence (owned by `ConfigStore`)
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Arm (or re-arm) a named schedule
    ///
    /// # Parameters
    ///
    /// - `name`: Schedule name
    /// - `initial_delay`: Delay before the first tick
    /// - `period`: Interval between ticks, must be non-zero
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Armed
    /// - `Err(Error::Config)`: `period` is zero
    async fn arm(&self, name: &str, initial_delay: Duration, period: Duration)
    -> Result<(), crate::Error>;

    /// Disarm a named schedule (no-op when not armed)
    async fn disarm(&self, name: &str);

    /// Whether `name` is currently armed
    fn is_armed(&self, name: &str) -> bool;

    /// Period of the armed schedule for `name`, if any
    fn armed_period(&self, name: &str) -> Option<Duration>;

    /// Stream of ticks for every armed schedule
    ///
    /// Only a single consumer is supported; implementations may return an
    /// empty stream on subsequent calls.
    fn ticks(&self) -> Pin<Box<dyn Stream<Item = Tick> + Send + 'static>>;

    /// Whether re-arming a name replaces its schedule atomically
    fn replaces_on_rearm(&self) -> bool {
        true
    }
}
