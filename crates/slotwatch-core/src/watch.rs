//! Watch-list types
//!
//! A [`WatchEntry`] is one store returned by a location search. The ordered
//! list of entries is owned by the [`ConfigStore`](crate::ConfigStore); the
//! engine only ever reads the selected subset.

use serde::{Deserialize, Serialize};

/// Human-readable store details carried alongside a watch entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Store name
    pub name: String,
    /// Street address line
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
}

impl DisplayInfo {
    /// `"{city}, {state} {postalCode}"`
    pub fn locality(&self) -> String {
        format!("{}, {} {}", self.city, self.state, self.postal_code)
    }
}

/// One watched location
///
/// Identity is `location_id`; two entries with the same id describe the same
/// store regardless of the other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEntry {
    /// Store identifier used by the availability endpoint
    pub location_id: String,

    /// Whether the monitor should poll this store
    #[serde(default)]
    pub selected: bool,

    /// Distance from the searched address, in miles
    #[serde(default)]
    pub distance_hint: f64,

    /// Display details
    #[serde(default)]
    pub display_info: DisplayInfo,
}

impl WatchEntry {
    /// Create an unselected entry
    pub fn new(location_id: impl Into<String>, display_info: DisplayInfo) -> Self {
        Self {
            location_id: location_id.into(),
            selected: false,
            distance_hint: 0.0,
            display_info,
        }
    }

    /// Set the distance hint
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance_hint = distance;
        self
    }

    /// Select or deselect the entry
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// Distance formatted for display, e.g. `"3.14 mile(s)"`
    pub fn distance_label(&self) -> String {
        format!("{:.2} mile(s)", self.distance_hint)
    }
}

/// Ordered watch-list; insertion order is search-result rank
pub type WatchList = Vec<WatchEntry>;

/// Entries the monitor should poll, in list order
pub fn selected_entries(list: &[WatchEntry]) -> Vec<WatchEntry> {
    list.iter().filter(|entry| entry.selected).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_entry_wire_format() {
        let json = serde_json::json!({
            "locationId": "123",
            "selected": true,
            "distanceHint": 2.5,
            "displayInfo": {
                "name": "Main St",
                "address1": "1 Main St",
                "city": "Austin",
                "state": "TX",
                "postalCode": "78701"
            }
        });

        let entry: WatchEntry = serde_json::from_value(json).unwrap();
        assert_eq!(entry.location_id, "123");
        assert!(entry.selected);
        assert_eq!(entry.display_info.locality(), "Austin, TX 78701");
        assert_eq!(entry.distance_label(), "2.50 mile(s)");
    }

    #[test]
    fn test_selected_defaults_to_false() {
        let entry: WatchEntry =
            serde_json::from_value(serde_json::json!({ "locationId": "9" })).unwrap();
        assert!(!entry.selected);
        assert_eq!(entry.display_info, DisplayInfo::default());
    }

    #[test]
    fn test_selected_entries_preserves_order() {
        let list = vec![
            WatchEntry::new("1", DisplayInfo::default()).with_selected(true),
            WatchEntry::new("2", DisplayInfo::default()),
            WatchEntry::new("3", DisplayInfo::default()).with_selected(true),
        ];

        let ids: Vec<_> = selected_entries(&list)
            .into_iter()
            .map(|e| e.location_id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
