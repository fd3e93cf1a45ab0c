// # slotwatch-core
//
// Core library for the pickup-slot availability monitor.
//
// ## Architecture Overview
//
// - **ConfigStore**: Typed, default-on-miss view over a raw StateStore
// - **AvailabilityClient**: Trait for querying one location's pickup slots
// - **NotificationSink**: Trait for alerts with at most one live record per key
// - **Scheduler**: Trait for named periodic ticks
// - **MonitorEngine**: Turns ticks into per-location queries and alert updates
// - **ControlChannel**: Typed messages from a foreground surface to the engine
//
// ## Design Principles
//
// 1. **Separation of Concerns**: HTTP, alert delivery and persistence sit
//    behind traits; the engine only sequences them
// 2. **Idempotent Alerts**: Repeating a pass never stacks alerts
// 3. **Library-First**: The daemon is a thin wrapper over this crate

pub mod config;
pub mod config_store;
pub mod control;
pub mod engine;
pub mod error;
pub mod notify;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod traits;
pub mod watch;

// Re-export core types for convenience
pub use config::{EngineConfig, MonitorConfig, Preferences};
pub use config_store::ConfigStore;
pub use control::{ControlMessage, ControlReply, ControlSender};
pub use engine::{EngineEvent, MonitorEngine, PassSummary, QueryOutcome, QueryReport};
pub use error::{Error, Result};
pub use notify::MemoryNotificationSink;
pub use scheduler::TokioScheduler;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{
    AvailabilityClient, NotificationContent, NotificationHandle, NotificationKey,
    NotificationSink, Scheduler, Slot, StateStore, StoreLocator, StoreQuery, Tick,
};
pub use watch::{DisplayInfo, WatchEntry, WatchList};
