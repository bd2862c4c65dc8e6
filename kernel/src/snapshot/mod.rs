// Membership Snapshots
//
// The last observed full membership of one collection. A snapshot is
// replaced wholesale on every reconciliation run, never patched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod store;

pub use store::{InMemorySnapshotStore, JsonSnapshotStore, SnapshotError, SnapshotStore};

/// Separator between an item's title and its primary contributor.
pub const KEY_SEPARATOR: &str = " - ";

/// Entity reported for keys without a contributor part.
pub const UNKNOWN_ENTITY: &str = "Unknown";

/// A member of a collection at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Stable identity within a collection.
    #[serde(rename = "song")]
    pub key: String,

    /// When the item joined the collection, if the source still knows.
    #[serde(rename = "added_at", default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl TrackedItem {
    pub fn new(key: impl Into<String>, observed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            observed_at,
        }
    }

    /// Secondary entity (the contributor) this item is credited to.
    pub fn entity(&self) -> &str {
        entity_of(&self.key)
    }
}

/// Text after the last `" - "` of an item key.
pub fn entity_of(key: &str) -> &str {
    key.rsplit_once(KEY_SEPARATOR)
        .map(|(_, entity)| entity)
        .unwrap_or(UNKNOWN_ENTITY)
}

/// Ordered membership of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub items: Vec<TrackedItem>,
}

impl Snapshot {
    pub fn new(items: Vec<TrackedItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedItem> {
        self.items.iter()
    }
}

impl FromIterator<TrackedItem> for Snapshot {
    fn from_iter<I: IntoIterator<Item = TrackedItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_is_taken_after_last_separator() {
        assert_eq!(entity_of("Song - Part 2 - Artist"), "Artist");
        assert_eq!(entity_of("Untitled"), UNKNOWN_ENTITY);
    }

    #[test]
    fn snapshot_json_shape() {
        let json = r#"[
            {"song": "X - Y", "added_at": "2025-02-24T15:32:11Z"},
            {"song": "Old - Z", "added_at": null}
        ]"#;

        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.items[0].entity(), "Y");
        assert!(snapshot.items[1].observed_at.is_none());

        let encoded = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            encoded,
            r#"[{"song":"X - Y","added_at":"2025-02-24T15:32:11Z"},{"song":"Old - Z","added_at":null}]"#
        );
    }
}
