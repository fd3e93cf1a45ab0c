//! Outcomes reported by background passes and foreground queries

use serde::Serialize;

use crate::render;
use crate::traits::Slot;
use crate::watch::WatchEntry;

/// Tally of one background pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    /// Locations whose query ran
    pub checked: usize,
    /// Queries that returned slots
    pub found: usize,
    /// Queries that returned no slots
    pub empty: usize,
    /// Queries that failed (network, parse or timeout)
    pub failed: usize,
    /// Locations skipped because an earlier query was still outstanding
    pub skipped: usize,
}

/// Result of querying one location
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum QueryOutcome {
    Available { slots: Vec<Slot> },
    Unavailable,
    Failed { error: String },
}

/// Foreground query result for one watched location
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub location_id: String,
    pub selected: bool,
    pub distance: String,
    pub outcome: QueryOutcome,
    /// Human-readable block for display
    pub text: String,
}

impl QueryReport {
    pub(crate) fn new(entry: &WatchEntry, outcome: QueryOutcome, max_slot: usize) -> Self {
        let text = match &outcome {
            QueryOutcome::Available { slots } => {
                render::availability_message(entry, slots, max_slot)
            }
            QueryOutcome::Unavailable => format!(
                "{}\nNo slots available",
                render::store_block(&entry.display_info)
            ),
            QueryOutcome::Failed { error } => format!(
                "{}\nCheck failed: {}",
                render::store_block(&entry.display_info),
                error
            ),
        };

        Self {
            location_id: entry.location_id.clone(),
            selected: entry.selected,
            distance: entry.distance_label(),
            outcome,
            text,
        }
    }

    pub fn has_slots(&self) -> bool {
        matches!(self.outcome, QueryOutcome::Available { .. })
    }
}
