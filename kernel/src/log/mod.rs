// Yearly Event Log
//
// Immutable add/remove facts, grouped per local calendar year. A year's
// log only ever grows: merging collapses entries sharing the same
// (timestamp, rendered text) pair and keeps the result in timestamp order.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, FixedOffset, SecondsFormat};
use chrono_tz::Tz;
use serde::Serialize;

mod store;

pub use store::{InMemoryLogStore, JsonYearLogStore, LogError, YearLogStore};

/// Timezone-aware instant as persisted in a year log.
pub type Timestamp = DateTime<FixedOffset>;

const ADDED_MARKER: &str = " was added to '";
const REMOVED_MARKER: &str = " was removed from '";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Added,
    Removed,
}

impl EventKind {
    fn marker(self) -> &'static str {
        match self {
            EventKind::Added => ADDED_MARKER,
            EventKind::Removed => REMOVED_MARKER,
        }
    }
}

/// A single membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Timestamp,
    pub collection: String,
    pub kind: EventKind,
    pub item_key: String,
    pub rendered_text: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognised event text: {0:?}")]
pub struct DecodeError(pub String);

impl Event {
    /// Build an event; the rendered text is a pure function of the fields.
    pub fn new(
        timestamp: Timestamp,
        collection: impl Into<String>,
        kind: EventKind,
        item_key: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        let item_key = item_key.into();
        let rendered_text = format!("{item_key}{}{collection}'", kind.marker());

        Self {
            timestamp,
            collection,
            kind,
            item_key,
            rendered_text,
        }
    }

    /// Recover the structured event from its persisted text.
    ///
    /// The last kind marker wins and the collection must be quoted to the
    /// end of the text, so names never match as substrings of each other.
    pub fn decode(timestamp: Timestamp, text: &str) -> Result<Self, DecodeError> {
        let kind = match (text.rfind(ADDED_MARKER), text.rfind(REMOVED_MARKER)) {
            (Some(a), Some(r)) if r > a => EventKind::Removed,
            (Some(_), _) => EventKind::Added,
            (None, Some(_)) => EventKind::Removed,
            (None, None) => return Err(DecodeError(text.to_string())),
        };

        let (item_key, rest) = text
            .rsplit_once(kind.marker())
            .ok_or_else(|| DecodeError(text.to_string()))?;
        let collection = rest
            .strip_suffix('\'')
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DecodeError(text.to_string()))?;

        let event = Self::new(timestamp, collection, kind, item_key);
        debug_assert_eq!(event.rendered_text, text);
        Ok(event)
    }

    /// Key under which merge collapses duplicate entries.
    pub fn dedup_key(&self) -> (String, String) {
        (canonical_timestamp(&self.timestamp), self.rendered_text.clone())
    }

    pub fn local_year(&self, tz: &Tz) -> i32 {
        local_year(&self.timestamp, tz)
    }
}

/// RFC 3339 with offset; fractional seconds only when present.
pub fn canonical_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn local_year(ts: &Timestamp, tz: &Tz) -> i32 {
    ts.with_timezone(tz).year()
}

/// Group events by the local calendar year of their timestamp.
pub fn bucket_by_year(events: Vec<Event>, tz: &Tz) -> BTreeMap<i32, Vec<Event>> {
    let mut buckets: BTreeMap<i32, Vec<Event>> = BTreeMap::new();
    for event in events {
        buckets.entry(event.local_year(tz)).or_default().push(event);
    }
    buckets
}

/// Added/removed totals for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub added: usize,
    pub removed: usize,
}

/// All entries recorded for one local calendar year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearLog {
    year: i32,
    entries: Vec<Event>,
}

impl YearLog {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            entries: Vec::new(),
        }
    }

    /// Wrap entries exactly as persisted, without reordering.
    pub fn from_entries(year: i32, entries: Vec<Event>) -> Self {
        Self { year, entries }
    }

    /// Build a deduplicated, ordered log from arbitrary events.
    pub fn normalized(year: i32, events: Vec<Event>) -> Self {
        let mut log = Self::new(year);
        log.merge(events);
        log
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn entries(&self) -> &[Event] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge new events into the log.
    ///
    /// Existing entries keep precedence; the sort is stable, so entries
    /// sharing a timestamp keep their relative order. Returns the number
    /// of entries the log grew by.
    pub fn merge(&mut self, events: impl IntoIterator<Item = Event>) -> usize {
        let before = self.entries.len();
        let mut seen = HashSet::new();

        let mut merged: Vec<Event> = self
            .entries
            .drain(..)
            .chain(events)
            .filter(|event| seen.insert(event.dedup_key()))
            .collect();
        merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        self.entries = merged;
        self.entries.len().saturating_sub(before)
    }

    /// Per-collection totals over the complete log.
    pub fn summary(&self) -> BTreeMap<String, CollectionSummary> {
        let mut summary: BTreeMap<String, CollectionSummary> = BTreeMap::new();
        for event in &self.entries {
            let counts = summary.entry(event.collection.clone()).or_default();
            match event.kind {
                EventKind::Added => counts.added += 1,
                EventKind::Removed => counts.removed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn pacific(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn rendered_text_is_deterministic() {
        let ts = pacific(2025, 2, 24, 7, 32);
        let a = Event::new(ts, "1", EventKind::Added, "X - Y");
        let b = Event::new(ts, "1", EventKind::Added, "X - Y");

        assert_eq!(a.rendered_text, "X - Y was added to '1'");
        assert_eq!(a, b);
        assert_eq!(
            Event::new(ts, "2", EventKind::Removed, "X - Y").rendered_text,
            "X - Y was removed from '2'"
        );
    }

    #[test]
    fn decode_recovers_structure() {
        let ts = pacific(2025, 2, 24, 7, 32);
        let event = Event::decode(ts, "Lovers - Band was added to 'Songs that are Girls' Names'")
            .unwrap();

        assert_eq!(event.kind, EventKind::Added);
        assert_eq!(event.collection, "Songs that are Girls' Names");
        assert_eq!(event.item_key, "Lovers - Band");
    }

    #[test]
    fn decode_does_not_confuse_overlapping_names() {
        let ts = pacific(2025, 2, 24, 7, 32);
        let event = Event::decode(ts, "Song - A was removed from '0.5'").unwrap();

        assert_eq!(event.collection, "0.5");
        assert_eq!(event.kind, EventKind::Removed);
    }

    #[test]
    fn decode_rejects_free_text() {
        let ts = pacific(2025, 2, 24, 7, 32);
        assert!(Event::decode(ts, "something happened").is_err());
        assert!(Event::decode(ts, "X was added to ''").is_err());
    }

    #[test]
    fn merge_collapses_rediscovered_event() {
        let ts = pacific(2025, 3, 1, 12, 0);
        let mut log = YearLog::new(2025);
        log.merge(vec![Event::new(ts, "1", EventKind::Added, "A - a")]);

        let grew = log.merge(vec![Event::new(ts, "1", EventKind::Added, "A - a")]);

        assert_eq!(grew, 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn merge_keeps_chronological_order() {
        let mut log = YearLog::new(2025);
        log.merge(vec![Event::new(pacific(2025, 5, 1, 0, 0), "1", EventKind::Added, "B - b")]);
        log.merge(vec![Event::new(pacific(2025, 1, 1, 0, 0), "1", EventKind::Added, "A - a")]);

        let keys: Vec<_> = log.entries().iter().map(|e| e.item_key.as_str()).collect();
        assert_eq!(keys, vec!["A - a", "B - b"]);
    }

    #[test]
    fn summary_counts_complete_log() {
        let ts = pacific(2025, 3, 1, 12, 0);
        let log = YearLog::normalized(
            2025,
            vec![
                Event::new(ts, "1", EventKind::Added, "A - a"),
                Event::new(ts, "1", EventKind::Added, "B - b"),
                Event::new(ts, "1", EventKind::Removed, "A - a"),
                Event::new(ts, "2", EventKind::Added, "A - a"),
            ],
        );

        let summary = log.summary();
        assert_eq!(summary["1"], CollectionSummary { added: 2, removed: 1 });
        assert_eq!(summary["2"], CollectionSummary { added: 1, removed: 0 });
    }

    #[test]
    fn year_uses_local_zone() {
        let utc_new_year = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 1, 7, 59, 0)
            .unwrap();

        assert_eq!(local_year(&utc_new_year, &chrono_tz::America::Los_Angeles), 2025);
        assert_eq!(local_year(&utc_new_year, &chrono_tz::UTC), 2026);
    }

    fn sample(offset: i64, item: usize, added: bool) -> Event {
        let kind = if added {
            EventKind::Added
        } else {
            EventKind::Removed
        };
        Event::new(
            pacific(2025, 3, 1, 12, 0) + Duration::minutes(offset),
            "1",
            kind,
            format!("Song {item} - Artist"),
        )
    }

    proptest! {
        #[test]
        fn merge_is_idempotent_ordered_and_unique(
            specs in proptest::collection::vec((0i64..30, 0usize..4, any::<bool>()), 0..40)
        ) {
            let events: Vec<Event> = specs
                .iter()
                .map(|(offset, item, added)| sample(*offset, *item, *added))
                .collect();

            let mut log = YearLog::new(2025);
            log.merge(events.clone());
            let once = log.clone();
            let grew = log.merge(events);

            prop_assert_eq!(grew, 0);
            prop_assert_eq!(&log, &once);
            prop_assert!(log.entries().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            let keys: HashSet<_> = log.entries().iter().map(Event::dedup_key).collect();
            prop_assert_eq!(keys.len(), log.len());
        }
    }
}
