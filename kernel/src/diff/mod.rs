// Snapshot Diff
//
// Compares the previous and freshly observed membership of one collection
// and emits the change events between them. Pure: the only clock is the
// `now` argument.
//
// Added items carry the source's own `added_at` when it is known, so
// infrequent runs still order history correctly. Removals are stamped
// with `now`, the instant they were discovered; the true removal time
// is not available from the source.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::log::{Event, EventKind, Timestamp};
use crate::snapshot::{Snapshot, TrackedItem};

/// Number of items added and removed by one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub events: Vec<Event>,
    pub counts: DiffCounts,
}

fn to_local(instant: DateTime<Utc>, tz: &Tz) -> Timestamp {
    instant.with_timezone(tz).fixed_offset()
}

/// Items of `snapshot` with repeated keys dropped, first occurrence kept.
fn distinct(snapshot: &Snapshot) -> Vec<&TrackedItem> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .filter(|&item| seen.insert(item.key.as_str()))
        .collect()
}

/// Diff two snapshots of `collection`.
///
/// Membership is by key: an item listed twice is one member, so it yields
/// at most one event. Additions come first in `new` order, then removals
/// in `old` order.
pub fn diff(old: &Snapshot, new: &Snapshot, collection: &str, now: DateTime<Utc>, tz: &Tz) -> Diff {
    let old = distinct(old);
    let new = distinct(new);
    let old_keys: HashSet<&str> = old.iter().map(|item| item.key.as_str()).collect();
    let new_keys: HashSet<&str> = new.iter().map(|item| item.key.as_str()).collect();

    let discovered_at = to_local(now, tz);
    let mut events = Vec::new();

    for item in new.iter().filter(|item| !old_keys.contains(item.key.as_str())) {
        let timestamp = item
            .observed_at
            .map(|at| to_local(at, tz))
            .unwrap_or(discovered_at);
        events.push(Event::new(timestamp, collection, EventKind::Added, &item.key));
    }
    let added = events.len();

    for item in old.iter().filter(|item| !new_keys.contains(item.key.as_str())) {
        events.push(Event::new(discovered_at, collection, EventKind::Removed, &item.key));
    }
    let removed = events.len() - added;

    Diff {
        events,
        counts: DiffCounts { added, removed },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use chrono_tz::America::Los_Angeles;

    fn item(key: &str) -> TrackedItem {
        TrackedItem::new(key, None)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn reports_added_and_removed() {
        let old = Snapshot::new(vec![item("A - a"), item("B - b")]);
        let new = Snapshot::new(vec![item("B - b"), item("C - c")]);

        let diff = diff(&old, &new, "1", now(), &Los_Angeles);

        assert_eq!(diff.counts, DiffCounts { added: 1, removed: 1 });
        assert_eq!(diff.events[0].kind, EventKind::Added);
        assert_eq!(diff.events[0].item_key, "C - c");
        assert_eq!(diff.events[1].kind, EventKind::Removed);
        assert_eq!(diff.events[1].item_key, "A - a");
    }

    #[test]
    fn addition_uses_source_timestamp_in_local_zone() {
        let added_at = Utc.with_ymd_and_hms(2025, 2, 24, 15, 32, 11).unwrap();
        let new = Snapshot::new(vec![TrackedItem::new("X - Y", Some(added_at))]);

        let diff = diff(&Snapshot::default(), &new, "1", now(), &Los_Angeles);

        assert_eq!(diff.events.len(), 1);
        let event = &diff.events[0];
        assert_eq!(event.kind, EventKind::Added);
        assert_eq!(event.timestamp.to_rfc3339(), "2025-02-24T07:32:11-08:00");
        assert!(event.rendered_text.contains("X - Y"));
        assert!(event.rendered_text.contains("'1'"));
    }

    #[test]
    fn addition_without_source_timestamp_falls_back_to_now() {
        let new = Snapshot::new(vec![item("X - Y")]);

        let diff = diff(&Snapshot::default(), &new, "1", now(), &Los_Angeles);

        assert_eq!(diff.events[0].timestamp, now());
    }

    #[test]
    fn removal_is_stamped_at_discovery() {
        let added_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let old = Snapshot::new(vec![TrackedItem::new("X - Y", Some(added_at))]);

        let diff = diff(&old, &Snapshot::default(), "1", now(), &Los_Angeles);

        assert_eq!(diff.counts, DiffCounts { added: 0, removed: 1 });
        assert_eq!(diff.events[0].timestamp, now());
    }

    #[test]
    fn unchanged_membership_yields_nothing() {
        let snapshot = Snapshot::new(vec![item("A - a"), item("B - b")]);

        let diff = diff(&snapshot, &snapshot, "1", now(), &Los_Angeles);

        assert!(diff.events.is_empty());
        assert_eq!(diff.counts, DiffCounts::default());
    }

    #[test]
    fn repeated_key_counts_as_one_member() {
        let twice = Snapshot::new(vec![
            TrackedItem::new("X - Y", Some(Utc.with_ymd_and_hms(2025, 1, 5, 20, 0, 0).unwrap())),
            TrackedItem::new("X - Y", Some(Utc.with_ymd_and_hms(2025, 1, 6, 20, 0, 0).unwrap())),
        ]);
        let empty = Snapshot::default();

        let added = diff(&empty, &twice, "1", now(), &Los_Angeles);
        assert_eq!(added.counts, DiffCounts { added: 1, removed: 0 });
        assert_eq!(added.events[0].timestamp.day(), 5);

        let removed = diff(&twice, &empty, "1", now(), &Los_Angeles);
        assert_eq!(removed.counts, DiffCounts { added: 0, removed: 1 });

        let unchanged = diff(&twice, &Snapshot::new(vec![item("X - Y")]), "1", now(), &Los_Angeles);
        assert!(unchanged.events.is_empty());
    }
}
