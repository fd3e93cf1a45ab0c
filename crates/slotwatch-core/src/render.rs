//! Text rendering for store blocks and slot lists
//!
//! Produces the plain-text message body used in notifications and in
//! foreground query output.

use crate::config::EngineConfig;
use crate::traits::{NotificationContent, Slot};
use crate::watch::{DisplayInfo, WatchEntry};

/// Store block: name, street address, then `city, state zip`
pub fn store_block(info: &DisplayInfo) -> String {
    format!("{}\n{}\n{}", info.name, info.address1, info.locality())
}

/// First `max_slot` slots, one `"{date}: HH:MM - HH:MM"` line each
pub fn slot_lines(slots: &[Slot], max_slot: usize) -> Vec<String> {
    slots.iter().take(max_slot).map(Slot::render).collect()
}

/// Store block followed by the slot lines
pub fn availability_message(entry: &WatchEntry, slots: &[Slot], max_slot: usize) -> String {
    let mut lines = vec![store_block(&entry.display_info)];
    lines.extend(slot_lines(slots, max_slot));
    lines.join("\n")
}

/// Notification content announcing slots at `entry`
pub fn slot_notification(
    config: &EngineConfig,
    entry: &WatchEntry,
    slots: &[Slot],
    max_slot: usize,
) -> NotificationContent {
    NotificationContent::new(
        config.notification_title.clone(),
        availability_message(entry, slots, max_slot),
    )
    .with_reference(config.reference_for(&entry.location_id))
    .with_icon(config.icon_url.clone())
}
