//! Core traits for the slot monitor
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AvailabilityClient`]: Query one location's pickup slots
//! - [`StoreLocator`]: Search stores to seed the watch-list
//! - [`NotificationSink`]: At most one live alert per key
//! - [`Scheduler`]: Named periodic triggers
//! - [`StateStore`]: Raw key/value persistence

pub mod availability;
pub mod notification_sink;
pub mod scheduler;
pub mod state_store;

pub use availability::{AvailabilityClient, Slot, SlotQueryResult, StoreLocator, StoreQuery};
pub use notification_sink::{
    NotificationContent, NotificationHandle, NotificationKey, NotificationSink,
};
pub use scheduler::{Scheduler, Tick};
pub use state_store::StateStore;
